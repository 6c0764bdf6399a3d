use std::fs;

use camino::Utf8PathBuf;

use crate::domain::{Accession, JobRecord};
use crate::error::BatchError;

pub const ACCESSION_LIST: &str = "assemblies.txt";
pub const ZIPS_DIR: &str = "zips";
pub const OUT_DIR: &str = "out";
pub const LOGS_DIR: &str = "logs";

/// Workspace paths. Every per-accession artifact lives at a path derived only from
/// the accession, so workers never share a file.
#[derive(Debug, Clone)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn accession_list(&self) -> Utf8PathBuf {
        self.root.join(ACCESSION_LIST)
    }

    pub fn zips_dir(&self) -> Utf8PathBuf {
        self.root.join(ZIPS_DIR)
    }

    pub fn out_root(&self) -> Utf8PathBuf {
        self.root.join(OUT_DIR)
    }

    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn job_log(&self) -> Utf8PathBuf {
        self.logs_dir().join("parallel_jobs.tsv")
    }

    pub fn manifest(&self) -> Utf8PathBuf {
        self.logs_dir().join("manifest.tsv")
    }

    pub fn default_datasets_bin(&self) -> Utf8PathBuf {
        self.root.join(datasets_exe_name())
    }

    /// Workspace-relative job paths, as recorded in the manifest.
    pub fn job(acc: &Accession) -> JobRecord {
        JobRecord {
            accession: acc.clone(),
            zip_path: Utf8PathBuf::from(ZIPS_DIR).join(format!("{acc}.zip")),
            out_dir: Utf8PathBuf::from(OUT_DIR).join(acc.as_str()),
        }
    }

    pub fn zip_path(&self, acc: &Accession) -> Utf8PathBuf {
        self.zips_dir().join(format!("{acc}.zip"))
    }

    pub fn out_dir(&self, acc: &Accession) -> Utf8PathBuf {
        self.out_root().join(acc.as_str())
    }

    /// The completion marker for the fetch phase: archive present and non-empty.
    pub fn archive_ready(&self, acc: &Accession) -> bool {
        fs::metadata(self.zip_path(acc).as_std_path())
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    pub fn archive_present(&self, acc: &Accession) -> bool {
        self.zip_path(acc).as_std_path().is_file()
    }

    pub fn ensure_dirs(&self) -> Result<(), BatchError> {
        for dir in [self.zips_dir(), self.out_root(), self.logs_dir()] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| BatchError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }
}

fn datasets_exe_name() -> &'static str {
    if cfg!(windows) {
        "datasets.exe"
    } else {
        "datasets"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_paths_are_derived_from_accession() {
        let acc: Accession = "GCF_000005845.2".parse().unwrap();
        let job = Layout::job(&acc);
        assert_eq!(job.zip_path, "zips/GCF_000005845.2.zip");
        assert_eq!(job.out_dir, "out/GCF_000005845.2");

        let layout = Layout::new("/work");
        assert_eq!(layout.zip_path(&acc), "/work/zips/GCF_000005845.2.zip");
        assert_eq!(layout.manifest(), "/work/logs/manifest.tsv");
    }

    #[test]
    fn empty_archive_is_not_ready() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let layout = Layout::new(root);
        layout.ensure_dirs().unwrap();
        let acc: Accession = "GCA_020379485.1".parse().unwrap();

        assert!(!layout.archive_ready(&acc));
        fs::write(layout.zip_path(&acc).as_std_path(), b"").unwrap();
        assert!(layout.archive_present(&acc));
        assert!(!layout.archive_ready(&acc));
        fs::write(layout.zip_path(&acc).as_std_path(), b"PK").unwrap();
        assert!(layout.archive_ready(&acc));
    }
}
