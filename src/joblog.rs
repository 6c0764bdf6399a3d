use std::fs::{self, File, OpenOptions};
use std::path::Path;

use csv::{Writer, WriterBuilder};

use crate::error::BatchError;
use crate::pool::{JobOutcome, Phase};

pub const JOB_LOG_HEADER: [&str; 8] = [
    "seq",
    "phase",
    "accession",
    "starttime",
    "jobruntime",
    "exitval",
    "status",
    "message",
];

/// Append-only TSV audit log, one row per finished job across runs.
pub struct JobLog {
    writer: Writer<File>,
}

impl JobLog {
    pub fn open(path: &Path) -> Result<Self, BatchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| BatchError::Filesystem(err.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| BatchError::Filesystem(format!("open {}: {err}", path.display())))?;
        let is_new = file
            .metadata()
            .map(|meta| meta.len() == 0)
            .map_err(|err| BatchError::Filesystem(err.to_string()))?;

        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer
                .write_record(JOB_LOG_HEADER)
                .map_err(|err| BatchError::Filesystem(err.to_string()))?;
        }
        Ok(Self { writer })
    }

    pub fn record(&mut self, phase: Phase, outcome: &JobOutcome) -> Result<(), BatchError> {
        let message = outcome
            .message
            .as_deref()
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        self.writer
            .write_record([
                outcome.seq.to_string(),
                phase.to_string(),
                outcome.accession.to_string(),
                outcome.started_at.to_rfc3339(),
                format!("{:.3}", outcome.runtime.as_secs_f64()),
                outcome.exit_code.to_string(),
                outcome.status.as_str().to_string(),
                message,
            ])
            .map_err(|err| BatchError::Filesystem(err.to_string()))?;
        // Rows must survive an interrupted run.
        self.writer
            .flush()
            .map_err(|err| BatchError::Filesystem(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::pool::JobStatus;

    fn outcome(seq: usize, status: JobStatus, message: Option<&str>) -> JobOutcome {
        JobOutcome {
            seq,
            accession: "GCF_000005845.2".parse().unwrap(),
            status,
            exit_code: if status == JobStatus::Failed { 1 } else { 0 },
            started_at: Utc::now(),
            runtime: Duration::from_millis(1500),
            message: message.map(str::to_string),
        }
    }

    #[test]
    fn header_written_once_across_opens() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("logs").join("parallel_jobs.tsv");

        let mut log = JobLog::open(&path).unwrap();
        log.record(Phase::Fetch, &outcome(1, JobStatus::Completed, None))
            .unwrap();
        drop(log);
        let mut log = JobLog::open(&path).unwrap();
        log.record(
            Phase::Unpack,
            &outcome(1, JobStatus::Failed, Some("bad\nzip")),
        )
        .unwrap();
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], JOB_LOG_HEADER.join("\t"));
        let fields: Vec<&str> = lines[2].split('\t').collect();
        assert_eq!(fields[1], "unpack");
        assert_eq!(fields[4], "1.500");
        assert_eq!(fields[5], "1");
        assert_eq!(fields[6], "failed");
        assert_eq!(fields[7], "bad zip");
    }
}
