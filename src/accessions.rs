use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use crate::domain::Accession;
use crate::error::BatchError;

const HEADER_PREFIX: &str = "Assembly";

/// Reads column 1 of a delimited table and returns the valid accessions, unique and
/// sorted. Row 1 is dropped as a header when its first field starts with `Assembly`.
/// The result may be empty; see [`require_accessions`].
pub fn collect_accessions(path: &Path, delimiter: u8) -> Result<Vec<Accession>, BatchError> {
    if !path.is_file() {
        return Err(BatchError::InputNotFound(path.to_path_buf()));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .map_err(|err| input_error(path, err))?;

    let mut accessions = BTreeSet::new();
    let mut dropped = 0usize;
    for (index, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|err| input_error(path, err))?;
        let Some(first) = record.get(0) else {
            continue;
        };
        let first = String::from_utf8_lossy(first);
        if index == 0 && first.starts_with(HEADER_PREFIX) {
            continue;
        }
        match first.parse::<Accession>() {
            Ok(acc) => {
                accessions.insert(acc);
            }
            Err(_) => dropped += 1,
        }
    }

    debug!(
        kept = accessions.len(),
        dropped,
        input = %path.display(),
        "accession table scanned"
    );

    Ok(accessions.into_iter().collect())
}

/// Fails with `NoValidAccessions` when nothing in `input` validated.
pub fn require_accessions(
    input: &Path,
    accessions: Vec<Accession>,
) -> Result<Vec<Accession>, BatchError> {
    if accessions.is_empty() {
        return Err(BatchError::NoValidAccessions(input.to_path_buf()));
    }
    Ok(accessions)
}

/// Writes one accession per line, replacing the file atomically.
pub fn write_accession_list(path: &Path, accessions: &[Accession]) -> Result<(), BatchError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| BatchError::Filesystem(err.to_string()))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".assemblies")
        .tempfile_in(parent)
        .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    for acc in accessions {
        writeln!(temp, "{acc}").map_err(|err| BatchError::Filesystem(err.to_string()))?;
    }
    temp.persist(path)
        .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    Ok(())
}

fn input_error(path: &Path, err: csv::Error) -> BatchError {
    BatchError::InputRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
