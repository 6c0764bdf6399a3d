use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use csv::{ReaderBuilder, WriterBuilder};

use crate::domain::JobRecord;
use crate::error::BatchError;

pub const MANIFEST_HEADER: [&str; 3] = ["accession", "zip_path", "out_dir"];

/// Rewrites the manifest in full: header plus one row per record, in the given order.
pub fn write_manifest(path: &Path, records: &[JobRecord]) -> Result<(), BatchError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| BatchError::Filesystem(err.to_string()))?;

    let temp = tempfile::Builder::new()
        .prefix(".manifest")
        .tempfile_in(parent)
        .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(temp);
    writer
        .write_record(MANIFEST_HEADER)
        .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    for record in records {
        writer
            .write_record([
                record.accession.as_str(),
                record.zip_path.as_str(),
                record.out_dir.as_str(),
            ])
            .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    }
    let temp = writer
        .into_inner()
        .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<Vec<JobRecord>, BatchError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .map_err(|err| BatchError::Filesystem(format!("read {}: {err}", path.display())))?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|err| BatchError::Filesystem(err.to_string()))?;
        let (Some(accession), Some(zip_path), Some(out_dir)) = (row.get(0), row.get(1), row.get(2))
        else {
            return Err(BatchError::Filesystem(format!(
                "malformed manifest row in {}",
                path.display()
            )));
        };
        records.push(JobRecord {
            accession: accession.parse()?,
            zip_path: Utf8PathBuf::from(zip_path),
            out_dir: Utf8PathBuf::from(out_dir),
        });
    }
    Ok(records)
}
