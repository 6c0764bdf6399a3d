use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::accessions::{collect_accessions, require_accessions, write_accession_list};
use crate::archive::{unpack_archive, verify_archive};
use crate::datasets::DatasetsClient;
use crate::domain::{Accession, ArtifactKind, JobRecord};
use crate::error::BatchError;
use crate::joblog::JobLog;
use crate::layout::Layout;
use crate::manifest::{read_manifest, write_manifest};
use crate::pool::{HaltPolicy, JobAction, Phase, PoolReport, PoolSummary, WorkerPool};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub delimiter: u8,
    pub jobs: usize,
    pub include: Vec<ArtifactKind>,
    pub verify_existing: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub accessions: usize,
    pub accession_list: String,
    pub probe_accession: String,
    pub fetch: PoolSummary,
    pub unpack: PoolSummary,
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestReport {
    pub accessions: usize,
    pub manifest: String,
    pub records: Vec<JobRecord>,
}

/// Drives one batch: extract, probe, fetch, unpack, manifest. Each phase blocks until
/// all of its jobs are done before the next one starts.
pub struct Pipeline<C: DatasetsClient> {
    layout: Layout,
    client: C,
}

impl<C: DatasetsClient> Pipeline<C> {
    pub fn new(layout: Layout, client: C) -> Self {
        Self { layout, client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn run(
        &self,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, BatchError> {
        let accessions = self.prepare_accessions(options, sink)?;

        let probe_accession = &accessions[0];
        emit(sink, format!("phase=Probe; summary genome {probe_accession}"));
        probe_reachability(&self.client, probe_accession)?;

        self.layout.ensure_dirs()?;
        let mut job_log = JobLog::open(self.layout.job_log().as_std_path())?;

        emit(
            sink,
            format!("phase=Fetch; {} accessions, {} workers", accessions.len(), options.jobs),
        );
        let started = Instant::now();
        let fetch = self.fetch_all(&accessions, options, &mut job_log)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Fetch; done: {} downloaded, {} skipped, {} failed",
                fetch.completed(),
                fetch.skipped(),
                fetch.failed()
            ),
            elapsed: Some(started.elapsed()),
        });
        if fetch.failed() > 0 {
            return Err(BatchError::FetchHalted {
                failed: fetch.failed(),
                not_started: fetch.not_started.len(),
            });
        }

        emit(sink, "phase=Unpack; extracting archives".to_string());
        let started = Instant::now();
        let unpack = self.unpack_all(&accessions, options.jobs, &mut job_log)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Unpack; done: {} extracted, {} failed",
                unpack.completed(),
                unpack.failed()
            ),
            elapsed: Some(started.elapsed()),
        });
        if unpack.failed() > 0 {
            warn!(failed = unpack.failed(), "some archives could not be unpacked");
        }

        emit(sink, "phase=Manifest; writing manifest".to_string());
        let manifest = self.write_manifest(&accessions)?;

        Ok(RunReport {
            accessions: accessions.len(),
            accession_list: self.layout.accession_list().to_string(),
            probe_accession: probe_accession.to_string(),
            fetch: fetch.summary(),
            unpack: unpack.summary(),
            manifest: manifest.to_string(),
        })
    }

    /// Extracts and validates the accessions, then persists the list. The list is written
    /// even when empty so `assemblies.txt` always reflects the latest input.
    pub fn prepare_accessions(
        &self,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Accession>, BatchError> {
        emit(
            sink,
            format!("phase=Resolve; reading {}", options.input.display()),
        );
        let accessions = collect_accessions(&options.input, options.delimiter)?;
        let list = self.layout.accession_list();
        write_accession_list(list.as_std_path(), &accessions)?;
        info!(count = accessions.len(), path = %list, "accession list written");
        require_accessions(&options.input, accessions)
    }

    /// Rebuilds the manifest from the input table without touching the network.
    pub fn rebuild_manifest(
        &self,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ManifestReport, BatchError> {
        let accessions = self.prepare_accessions(options, sink)?;
        let manifest = self.write_manifest(&accessions)?;
        let records = read_manifest(manifest.as_std_path())?;
        Ok(ManifestReport {
            accessions: records.len(),
            manifest: manifest.to_string(),
            records,
        })
    }

    pub fn fetch_all(
        &self,
        accessions: &[Accession],
        options: &RunOptions,
        job_log: &mut JobLog,
    ) -> Result<PoolReport, BatchError> {
        let pool = WorkerPool::new(options.jobs, HaltPolicy::StopOnFirstFailure);
        let mut log_error = None;
        let report = pool.run(
            Phase::Fetch,
            accessions,
            |acc| self.fetch_one(acc, &options.include, options.verify_existing),
            |outcome| {
                if let Err(err) = job_log.record(Phase::Fetch, outcome) {
                    log_error.get_or_insert(err);
                }
            },
        );
        if let Some(err) = log_error {
            return Err(err);
        }
        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            not_started = report.not_started.len(),
            "fetch phase finished"
        );
        Ok(report)
    }

    pub fn unpack_all(
        &self,
        accessions: &[Accession],
        jobs: usize,
        job_log: &mut JobLog,
    ) -> Result<PoolReport, BatchError> {
        let present: Vec<Accession> = accessions
            .iter()
            .filter(|acc| self.layout.archive_present(acc))
            .cloned()
            .collect();
        let pool = WorkerPool::new(jobs, HaltPolicy::ContinueOnFailure);
        let mut log_error = None;
        let report = pool.run(
            Phase::Unpack,
            &present,
            |acc| self.unpack_one(acc),
            |outcome| {
                if let Err(err) = job_log.record(Phase::Unpack, outcome) {
                    log_error.get_or_insert(err);
                }
            },
        );
        if let Some(err) = log_error {
            return Err(err);
        }
        info!(
            completed = report.completed(),
            failed = report.failed(),
            "unpack phase finished"
        );
        Ok(report)
    }

    fn fetch_one(
        &self,
        acc: &Accession,
        include: &[ArtifactKind],
        verify_existing: bool,
    ) -> Result<JobAction, BatchError> {
        let zip_path = self.layout.zip_path(acc);
        if self.layout.archive_ready(acc) {
            if !verify_existing {
                return Ok(JobAction::Skipped);
            }
            match verify_archive(zip_path.as_std_path()) {
                Ok(()) => return Ok(JobAction::Skipped),
                Err(err) => {
                    warn!(accession = %acc, error = %err, "existing archive unreadable; refetching");
                    remove_partial(&zip_path);
                }
            }
        }

        match self.client.download(acc, include, zip_path.as_std_path()) {
            Ok(()) => Ok(JobAction::Completed),
            Err(err) => {
                remove_partial(&zip_path);
                Err(err)
            }
        }
    }

    fn unpack_one(&self, acc: &Accession) -> Result<JobAction, BatchError> {
        let zip_path = self.layout.zip_path(acc);
        let out_dir = self.layout.out_dir(acc);
        unpack_archive(zip_path.as_std_path(), out_dir.as_std_path())
            .map_err(|err| match err {
                BatchError::Unpack { message, .. } => BatchError::Unpack {
                    accession: acc.to_string(),
                    message,
                },
                other => other,
            })?;
        Ok(JobAction::Completed)
    }

    fn write_manifest(&self, accessions: &[Accession]) -> Result<Utf8PathBuf, BatchError> {
        let records: Vec<JobRecord> = accessions.iter().map(Layout::job).collect();
        let path = self.layout.manifest();
        write_manifest(path.as_std_path(), &records)?;
        info!(rows = records.len(), path = %path, "manifest written");
        Ok(path)
    }
}

/// One read-only query before any bulk work, so a systemic failure costs one request.
pub fn probe_reachability<C: DatasetsClient + ?Sized>(
    client: &C,
    accession: &Accession,
) -> Result<(), BatchError> {
    let output = client.summary(accession).map_err(|err| match err {
        BatchError::MissingTool(tool) => BatchError::MissingTool(tool),
        other => BatchError::ProbeFailed {
            accession: accession.to_string(),
            message: other.to_string(),
        },
    })?;
    if output.trim().is_empty() {
        return Err(BatchError::ProbeFailed {
            accession: accession.to_string(),
            message: "empty summary response".to_string(),
        });
    }
    info!(%accession, "reachability probe ok");
    Ok(())
}

fn remove_partial(path: &Utf8Path) {
    if path.as_std_path().exists() {
        if let Err(err) = fs::remove_file(path.as_std_path()) {
            warn!(path = %path, error = %err, "failed to remove partial archive");
        }
    }
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}
