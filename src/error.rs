use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BatchError {
    #[error("required tool not found: {0}")]
    #[diagnostic(help("install the NCBI datasets CLI or drop --no-bootstrap"))]
    MissingTool(String),

    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("failed to read input file {path}: {message}")]
    InputRead { path: PathBuf, message: String },

    #[error("no valid accessions found in {0}")]
    #[diagnostic(help(
        "inspect assemblies.txt and check that column 1 holds GCA_/GCF_ accessions and that the delimiter is right"
    ))]
    NoValidAccessions(PathBuf),

    #[error("invalid genome accession: {0}")]
    InvalidAccession(String),

    #[error("invalid include value: {0}")]
    InvalidInclude(String),

    #[error("invalid delimiter: {0}")]
    InvalidDelimiter(String),

    #[error("worker count must be at least 1")]
    InvalidJobs,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("datasets download failed: {0}")]
    BootstrapHttp(String),

    #[error("datasets download returned status {status}: {url}")]
    BootstrapStatus { status: u16, url: String },

    #[error("reachability probe failed for {accession}: {message}")]
    #[diagnostic(help(
        "check network access; behind an intercepting proxy point --ca-bundle (SSL_CERT_FILE) at its certificate bundle"
    ))]
    ProbeFailed { accession: String, message: String },

    #[error("datasets exited with {}: {message}", exit_label(.exit_code))]
    DatasetsCommand {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("fetch phase halted: {failed} failed, {not_started} not started")]
    #[diagnostic(help(
        "see logs/parallel_jobs.tsv; re-run the same command to resume, completed archives are skipped"
    ))]
    FetchHalted { failed: usize, not_started: usize },

    #[error("failed to unpack {accession}: {message}")]
    Unpack { accession: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl BatchError {
    /// Process exit code for the `kira-gb` binary. Errors outside the tool, input, probe
    /// and fetch classes map to 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            BatchError::MissingTool(_)
            | BatchError::BootstrapHttp(_)
            | BatchError::BootstrapStatus { .. } => 2,
            BatchError::InputNotFound(_)
            | BatchError::InputRead { .. }
            | BatchError::NoValidAccessions(_) => 3,
            BatchError::ProbeFailed { .. } => 4,
            BatchError::FetchHalted { .. } => 5,
            _ => 1,
        }
    }

    /// Exit status reported in the job log for a failed job.
    pub fn exit_value(&self) -> i32 {
        match self {
            BatchError::DatasetsCommand {
                exit_code: Some(code),
                ..
            } => *code,
            _ => -1,
        }
    }
}

fn exit_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}
