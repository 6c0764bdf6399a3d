use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::Accession;
use crate::error::BatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Fetch,
    Unpack,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Fetch => write!(f, "fetch"),
            Phase::Unpack => write!(f, "unpack"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltPolicy {
    /// Stop handing out new jobs once one fails. Running jobs finish.
    StopOnFirstFailure,
    ContinueOnFailure,
}

/// What a successful job did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Skipped,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Skipped => "skipped",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// 1-based position in the dispatch order.
    pub seq: usize,
    pub accession: Accession,
    pub status: JobStatus,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub runtime: Duration,
    pub message: Option<String>,
}

impl JobOutcome {
    fn new(
        seq: usize,
        accession: Accession,
        started_at: DateTime<Utc>,
        runtime: Duration,
        result: Result<JobAction, BatchError>,
    ) -> Self {
        let (status, exit_code, message) = match result {
            Ok(JobAction::Completed) => (JobStatus::Completed, 0, None),
            Ok(JobAction::Skipped) => (JobStatus::Skipped, 0, None),
            Err(err) => (JobStatus::Failed, err.exit_value(), Some(err.to_string())),
        };
        Self {
            seq,
            accession,
            status,
            exit_code,
            started_at,
            runtime,
            message,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolReport {
    pub phase: Phase,
    pub outcomes: Vec<JobOutcome>,
    pub not_started: Vec<Accession>,
    pub halted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub phase: Phase,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_started: usize,
    pub halted: bool,
    pub failures: Vec<String>,
}

impl PoolReport {
    fn count(&self, status: JobStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    pub fn completed(&self) -> usize {
        self.count(JobStatus::Completed)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == JobStatus::Failed)
    }

    pub fn summary(&self) -> PoolSummary {
        PoolSummary {
            phase: self.phase,
            total: self.outcomes.len() + self.not_started.len(),
            completed: self.completed(),
            skipped: self.skipped(),
            failed: self.failed(),
            not_started: self.not_started.len(),
            halted: self.halted,
            failures: self
                .failures()
                .map(|outcome| outcome.accession.to_string())
                .collect(),
        }
    }
}

/// Fixed-size pool of scoped threads draining a list of accessions.
///
/// Workers claim the next accession from a shared cursor and report each finished job
/// over a channel. Only the calling thread sees the outcomes, so `on_finish` can write
/// to a shared log without locking.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    policy: HaltPolicy,
}

impl WorkerPool {
    pub fn new(workers: usize, policy: HaltPolicy) -> Self {
        Self {
            workers: workers.max(1),
            policy,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run<F, O>(
        &self,
        phase: Phase,
        accessions: &[Accession],
        job: F,
        mut on_finish: O,
    ) -> PoolReport
    where
        F: Fn(&Accession) -> Result<JobAction, BatchError> + Sync,
        O: FnMut(&JobOutcome),
    {
        let cursor = AtomicUsize::new(0);
        let halted = AtomicBool::new(false);
        let policy = self.policy;
        let workers = self.workers.min(accessions.len()).max(1);
        let mut outcomes = Vec::with_capacity(accessions.len());

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<JobOutcome>();
            for worker in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                let halted = &halted;
                let job = &job;
                scope.spawn(move || {
                    loop {
                        if halted.load(Ordering::SeqCst) {
                            break;
                        }
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(accession) = accessions.get(index) else {
                            break;
                        };
                        debug!(%phase, worker, %accession, "job started");
                        let started_at = Utc::now();
                        let start = Instant::now();
                        let result = job(accession);
                        let outcome = JobOutcome::new(
                            index + 1,
                            accession.clone(),
                            started_at,
                            start.elapsed(),
                            result,
                        );
                        if outcome.status == JobStatus::Failed
                            && policy == HaltPolicy::StopOnFirstFailure
                        {
                            halted.store(true, Ordering::SeqCst);
                        }
                        if tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for outcome in rx {
                if outcome.status == JobStatus::Failed {
                    warn!(
                        %phase,
                        accession = %outcome.accession,
                        exit_code = outcome.exit_code,
                        message = outcome.message.as_deref().unwrap_or(""),
                        "job failed"
                    );
                }
                on_finish(&outcome);
                outcomes.push(outcome);
            }
        });

        outcomes.sort_by_key(|outcome| outcome.seq);
        let started: BTreeSet<usize> = outcomes.iter().map(|outcome| outcome.seq - 1).collect();
        let not_started = accessions
            .iter()
            .enumerate()
            .filter(|(index, _)| !started.contains(index))
            .map(|(_, accession)| accession.clone())
            .collect();

        PoolReport {
            phase,
            outcomes,
            not_started,
            halted: halted.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn accessions(count: usize) -> Vec<Accession> {
        (0..count)
            .map(|index| format!("GCA_{:09}.1", index).parse().unwrap())
            .collect()
    }

    fn failure() -> BatchError {
        BatchError::DatasetsCommand {
            exit_code: Some(1),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn runs_every_job_when_nothing_fails() {
        let items = accessions(12);
        let pool = WorkerPool::new(4, HaltPolicy::StopOnFirstFailure);
        let mut seen = 0usize;
        let report = pool.run(
            Phase::Fetch,
            &items,
            |acc| {
                if acc.as_str().ends_with("3.1") {
                    Ok(JobAction::Skipped)
                } else {
                    Ok(JobAction::Completed)
                }
            },
            |_| seen += 1,
        );
        assert_eq!(seen, 12);
        assert_eq!(report.completed(), 11);
        assert_eq!(report.skipped(), 1);
        assert!(report.not_started.is_empty());
        assert!(!report.halted);
        let seqs: Vec<usize> = report.outcomes.iter().map(|outcome| outcome.seq).collect();
        assert_eq!(seqs, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn single_worker_stops_after_first_failure() {
        let items = accessions(4);
        let pool = WorkerPool::new(1, HaltPolicy::StopOnFirstFailure);
        let report = pool.run(
            Phase::Fetch,
            &items,
            |acc| {
                if acc == &items[1] {
                    Err(failure())
                } else {
                    Ok(JobAction::Completed)
                }
            },
            |_| {},
        );
        assert!(report.halted);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures().next().unwrap().exit_code, 1);
        assert_eq!(report.not_started, items[2..].to_vec());
    }

    #[test]
    fn in_flight_jobs_finish_but_queue_is_not_drained() {
        let items = accessions(10);
        let pool = WorkerPool::new(5, HaltPolicy::StopOnFirstFailure);
        let started = Mutex::new(Vec::new());
        let report = pool.run(
            Phase::Fetch,
            &items,
            |acc| {
                started.lock().unwrap().push(acc.clone());
                if acc == &items[0] {
                    return Err(failure());
                }
                thread::sleep(Duration::from_millis(50));
                Ok(JobAction::Completed)
            },
            |_| {},
        );
        assert!(report.halted);
        assert_eq!(report.failed(), 1);
        assert!(report.outcomes.len() <= 5);
        assert!(report.not_started.len() >= 5);
        assert_eq!(report.outcomes.len(), started.lock().unwrap().len());
        assert_eq!(report.outcomes.len() + report.not_started.len(), items.len());
    }

    #[test]
    fn continue_policy_isolates_failures() {
        let items = accessions(6);
        let pool = WorkerPool::new(3, HaltPolicy::ContinueOnFailure);
        let report = pool.run(
            Phase::Unpack,
            &items,
            |acc| {
                if acc == &items[2] || acc == &items[4] {
                    Err(failure())
                } else {
                    Ok(JobAction::Completed)
                }
            },
            |_| {},
        );
        assert!(!report.halted);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.completed(), 4);
        assert!(report.not_started.is_empty());
        assert_eq!(report.summary().failures.len(), 2);
    }

    #[test]
    fn zero_workers_is_clamped_to_one() {
        let pool = WorkerPool::new(0, HaltPolicy::ContinueOnFailure);
        assert_eq!(pool.workers(), 1);
        let report = pool.run(Phase::Unpack, &[], |_| Ok(JobAction::Completed), |_| {});
        assert!(report.outcomes.is_empty());
    }
}
