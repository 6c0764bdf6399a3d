use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::bootstrap;
use crate::domain::{ArtifactKind, default_include};
use crate::error::BatchError;

pub const DEFAULT_CONFIG: &str = "kira-gb.json";
pub const DEFAULT_INPUT: &str = "assemblies.tsv";
pub const DEFAULT_JOBS: usize = 4;

/// On-disk config file. Every field is optional; CLI flags win over it.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub include: Option<Vec<String>>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub datasets_bin: Option<PathBuf>,
    #[serde(default)]
    pub datasets_url: Option<String>,
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
    #[serde(default)]
    pub verify_existing: Option<bool>,
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input: Option<PathBuf>,
    pub delimiter: Option<String>,
    pub jobs: Option<usize>,
    pub include: Option<Vec<String>>,
    pub workdir: Option<PathBuf>,
    pub datasets_bin: Option<PathBuf>,
    pub datasets_url: Option<String>,
    pub ca_bundle: Option<PathBuf>,
    pub verify_existing: bool,
    pub no_bootstrap: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub input: PathBuf,
    pub delimiter: u8,
    pub jobs: usize,
    pub include: Vec<ArtifactKind>,
    pub workdir: Utf8PathBuf,
    pub datasets_bin: Option<PathBuf>,
    pub datasets_url: String,
    pub ca_bundle: Option<PathBuf>,
    pub verify_existing: bool,
    pub bootstrap: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>, overrides: Overrides) -> Result<ResolvedConfig, BatchError> {
        let config = Self::load(path)?;
        Self::resolve_config(config, overrides)
    }

    pub fn load(path: Option<&str>) -> Result<Config, BatchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BatchError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| BatchError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        config: Config,
        overrides: Overrides,
    ) -> Result<ResolvedConfig, BatchError> {
        let jobs = overrides.jobs.or(config.jobs).unwrap_or(DEFAULT_JOBS);
        if jobs == 0 {
            return Err(BatchError::InvalidJobs);
        }

        let delimiter = match overrides.delimiter.or(config.delimiter) {
            Some(value) => parse_delimiter(&value)?,
            None => b'\t',
        };

        let include = match overrides.include.or(config.include) {
            Some(values) => parse_include(&values)?,
            None => default_include(),
        };

        let workdir = match overrides.workdir.or(config.workdir) {
            Some(dir) => Utf8PathBuf::from_path_buf(dir).map_err(|dir| {
                BatchError::Filesystem(format!("non-utf8 workdir: {}", dir.display()))
            })?,
            None => Utf8PathBuf::from("."),
        };

        Ok(ResolvedConfig {
            input: overrides
                .input
                .or(config.input)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT)),
            delimiter,
            jobs,
            include,
            workdir,
            datasets_bin: overrides.datasets_bin.or(config.datasets_bin),
            datasets_url: overrides
                .datasets_url
                .or(config.datasets_url)
                .unwrap_or_else(bootstrap::default_datasets_url),
            ca_bundle: overrides.ca_bundle.or(config.ca_bundle),
            verify_existing: overrides.verify_existing || config.verify_existing.unwrap_or(false),
            bootstrap: !overrides.no_bootstrap,
        })
    }
}

/// Accepts a single byte, or the escapes `\t` and `tab`.
pub fn parse_delimiter(value: &str) -> Result<u8, BatchError> {
    match value {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        other if other.len() == 1 => Ok(other.as_bytes()[0]),
        other => Err(BatchError::InvalidDelimiter(other.to_string())),
    }
}

fn parse_include(values: &[String]) -> Result<Vec<ArtifactKind>, BatchError> {
    let mut kinds = Vec::new();
    for value in values.iter().flat_map(|value| value.split(',')) {
        let kind: ArtifactKind = value.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(BatchError::InvalidInclude("empty include set".to_string()));
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_apply_without_config() {
        let resolved =
            ConfigLoader::resolve_config(Config::default(), Overrides::default()).unwrap();
        assert_eq!(resolved.jobs, DEFAULT_JOBS);
        assert_eq!(resolved.delimiter, b'\t');
        assert_eq!(resolved.include, default_include());
        assert_eq!(resolved.input, PathBuf::from(DEFAULT_INPUT));
        assert!(resolved.bootstrap);
        assert!(!resolved.verify_existing);
    }

    #[test]
    fn overrides_win_over_file() {
        let config = Config {
            jobs: Some(8),
            include: Some(vec!["genome".to_string()]),
            ..Config::default()
        };
        let overrides = Overrides {
            jobs: Some(2),
            ..Overrides::default()
        };
        let resolved = ConfigLoader::resolve_config(config, overrides).unwrap();
        assert_eq!(resolved.jobs, 2);
        assert_eq!(resolved.include, vec![ArtifactKind::Genome]);
    }

    #[test]
    fn zero_jobs_rejected() {
        let overrides = Overrides {
            jobs: Some(0),
            ..Overrides::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(Config::default(), overrides),
            Err(BatchError::InvalidJobs)
        );
    }

    #[test]
    fn delimiter_forms() {
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_matches!(parse_delimiter("::"), Err(BatchError::InvalidDelimiter(_)));
    }
}
