use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::domain::{Accession, ArtifactKind};
use crate::error::BatchError;

/// The operations this tool needs from the NCBI datasets CLI.
pub trait DatasetsClient: Send + Sync {
    /// Read-only metadata query; returns the tool's stdout.
    fn summary(&self, accession: &Accession) -> Result<String, BatchError>;
    fn download(
        &self,
        accession: &Accession,
        include: &[ArtifactKind],
        destination: &Path,
    ) -> Result<(), BatchError>;
    fn version(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct SystemDatasetsClient {
    program: PathBuf,
    ca_bundle: Option<PathBuf>,
}

impl SystemDatasetsClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ca_bundle: None,
        }
    }

    /// Trust store for the child's TLS, exported as `SSL_CERT_FILE`.
    pub fn with_ca_bundle(mut self, ca_bundle: Option<PathBuf>) -> Self {
        self.ca_bundle = ca_bundle;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn summary_args(accession: &Accession) -> Vec<String> {
        vec![
            "summary".to_string(),
            "genome".to_string(),
            "accession".to_string(),
            accession.as_str().to_string(),
        ]
    }

    pub fn download_args(
        accession: &Accession,
        include: &[ArtifactKind],
        destination: &Path,
    ) -> Vec<String> {
        vec![
            "download".to_string(),
            "genome".to_string(),
            "accession".to_string(),
            accession.as_str().to_string(),
            "--include".to_string(),
            ArtifactKind::include_arg(include),
            "--no-progressbar".to_string(),
            "--filename".to_string(),
            destination.to_string_lossy().to_string(),
        ]
    }

    fn run_cmd(&self, args: &[String]) -> Result<String, BatchError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(bundle) = &self.ca_bundle {
            cmd.env("SSL_CERT_FILE", bundle);
        }
        debug!(program = %self.program.display(), ?args, "running datasets");
        let output = cmd.output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                BatchError::MissingTool(self.program.display().to_string())
            } else {
                BatchError::DatasetsCommand {
                    exit_code: None,
                    message: err.to_string(),
                }
            }
        })?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", self.program.display())
        } else {
            stderr
        };
        Err(BatchError::DatasetsCommand {
            exit_code: output.status.code(),
            message,
        })
    }
}

impl DatasetsClient for SystemDatasetsClient {
    fn summary(&self, accession: &Accession) -> Result<String, BatchError> {
        self.run_cmd(&Self::summary_args(accession))
    }

    fn download(
        &self,
        accession: &Accession,
        include: &[ArtifactKind],
        destination: &Path,
    ) -> Result<(), BatchError> {
        self.run_cmd(&Self::download_args(accession, include, destination))
            .map(|_| ())
    }

    fn version(&self) -> Option<String> {
        let version = self.run_cmd(&["--version".to_string()]).ok()?;
        let version = version.trim();
        (!version.is_empty()).then(|| version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::default_include;

    #[test]
    fn download_command_line() {
        let acc: Accession = "GCF_000005845.2".parse().unwrap();
        let args = SystemDatasetsClient::download_args(
            &acc,
            &default_include(),
            Path::new("zips/GCF_000005845.2.zip"),
        );
        assert_eq!(
            args,
            vec![
                "download",
                "genome",
                "accession",
                "GCF_000005845.2",
                "--include",
                "genome,gff3,protein,cds",
                "--no-progressbar",
                "--filename",
                "zips/GCF_000005845.2.zip",
            ]
        );
    }

    #[test]
    fn summary_command_line() {
        let acc: Accession = "GCA_020379485.1".parse().unwrap();
        assert_eq!(
            SystemDatasetsClient::summary_args(&acc),
            vec!["summary", "genome", "accession", "GCA_020379485.1"]
        );
    }

    #[test]
    fn missing_program_is_missing_tool() {
        let client = SystemDatasetsClient::new("/nonexistent/kira-gb/datasets");
        let acc: Accession = "GCA_020379485.1".parse().unwrap();
        assert_matches!(client.summary(&acc), Err(BatchError::MissingTool(_)));
        assert!(client.version().is_none());
    }
}
