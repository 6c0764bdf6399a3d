use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BatchError;

static ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(GCA|GCF)_[0-9]+\.[0-9]+$").expect("accession pattern"));

/// GenBank (`GCA_`) or RefSeq (`GCF_`) assembly accession, e.g. `GCF_000005845.2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim_end_matches('\r').trim();
        if !ACCESSION_RE.is_match(normalized) {
            return Err(BatchError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for Accession {
    type Error = BatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Accession> for String {
    fn from(value: Accession) -> Self {
        value.0
    }
}

/// Content kinds the datasets CLI can package for an assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Genome,
    Gff3,
    Gtf,
    Gbff,
    Rna,
    Protein,
    Cds,
    SeqReport,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Genome => "genome",
            ArtifactKind::Gff3 => "gff3",
            ArtifactKind::Gtf => "gtf",
            ArtifactKind::Gbff => "gbff",
            ArtifactKind::Rna => "rna",
            ArtifactKind::Protein => "protein",
            ArtifactKind::Cds => "cds",
            ArtifactKind::SeqReport => "seq-report",
        }
    }

    /// Comma-joined value for `datasets download --include`.
    pub fn include_arg(kinds: &[ArtifactKind]) -> String {
        kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "genome" => Ok(ArtifactKind::Genome),
            "gff3" => Ok(ArtifactKind::Gff3),
            "gtf" => Ok(ArtifactKind::Gtf),
            "gbff" => Ok(ArtifactKind::Gbff),
            "rna" => Ok(ArtifactKind::Rna),
            "protein" => Ok(ArtifactKind::Protein),
            "cds" => Ok(ArtifactKind::Cds),
            "seq-report" => Ok(ArtifactKind::SeqReport),
            other => Err(BatchError::InvalidInclude(other.to_string())),
        }
    }
}

pub fn default_include() -> Vec<ArtifactKind> {
    vec![
        ArtifactKind::Genome,
        ArtifactKind::Gff3,
        ArtifactKind::Protein,
        ArtifactKind::Cds,
    ]
}

/// One accession's archive and extraction target, relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub accession: Accession,
    pub zip_path: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_accession_trims_crlf_and_whitespace() {
        let acc: Accession = "  GCA_020379485.1 \r".parse().unwrap();
        assert_eq!(acc.as_str(), "GCA_020379485.1");
    }

    #[test]
    fn parse_accession_rejects_partial_matches() {
        for value in ["GCF_000005845", "GCF_000005845.2x", "gcf_000005845.2", "XGCA_1.1", ""] {
            assert_matches!(
                value.parse::<Accession>(),
                Err(BatchError::InvalidAccession(_))
            );
        }
    }

    #[test]
    fn include_arg_joins_kinds() {
        assert_eq!(
            ArtifactKind::include_arg(&default_include()),
            "genome,gff3,protein,cds"
        );
        assert_matches!(
            "fastq".parse::<ArtifactKind>(),
            Err(BatchError::InvalidInclude(_))
        );
    }
}
