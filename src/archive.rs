use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::BatchError;

/// Extracts `zip_path` under `target_dir`, creating it if needed. Existing files are
/// overwritten, so repeated runs converge on the archive's content. Returns the
/// number of files written.
pub fn unpack_archive(zip_path: &Path, target_dir: &Path) -> Result<usize, BatchError> {
    let unpack_err = |message: String| BatchError::Unpack {
        accession: archive_stem(zip_path),
        message,
    };

    fs::create_dir_all(target_dir).map_err(|err| unpack_err(err.to_string()))?;
    let file = fs::File::open(zip_path)
        .map_err(|err| unpack_err(format!("open {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| unpack_err(err.to_string()))?;

    let mut written = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| unpack_err(err.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(unpack_err(format!(
                "entry escapes target directory: {}",
                entry.name()
            )));
        };
        let entry_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|err| unpack_err(err.to_string()))?;
            continue;
        }
        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| unpack_err(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| unpack_err(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| unpack_err(err.to_string()))?;
        written += 1;
    }
    Ok(written)
}

/// Reads every entry through to the end so CRC mismatches and truncation surface.
/// Failures carry the accession named by the archive's file stem.
pub fn verify_archive(zip_path: &Path) -> Result<(), BatchError> {
    let corrupt = |message: String| BatchError::Unpack {
        accession: archive_stem(zip_path),
        message: format!("archive unreadable: {message}"),
    };

    let file = fs::File::open(zip_path).map_err(|err| corrupt(err.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|err| corrupt(err.to_string()))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| corrupt(err.to_string()))?;
        if !entry.is_dir() {
            io::copy(&mut entry, &mut io::sink())
                .map_err(|err| corrupt(format!("{}: {err}", entry.name())))?;
        }
    }
    Ok(())
}

fn archive_stem(zip_path: &Path) -> String {
    zip_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| zip_path.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn unpack_overwrites_existing_files() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("GCF_000005845.2.zip");
        write_zip(
            &zip_path,
            &[
                ("ncbi_dataset/data/GCF_000005845.2/genomic.gff", &b"gff"[..]),
                ("README.md", &b"readme"[..]),
            ],
        );
        let target = temp.path().join("out").join("GCF_000005845.2");
        fs::create_dir_all(target.join("ncbi_dataset/data/GCF_000005845.2")).unwrap();
        fs::write(
            target.join("ncbi_dataset/data/GCF_000005845.2/genomic.gff"),
            b"stale content that is longer",
        )
        .unwrap();

        assert_eq!(unpack_archive(&zip_path, &target).unwrap(), 2);
        assert_eq!(unpack_archive(&zip_path, &target).unwrap(), 2);
        assert_eq!(
            fs::read(target.join("ncbi_dataset/data/GCF_000005845.2/genomic.gff")).unwrap(),
            b"gff"
        );
    }

    #[test]
    fn corrupt_archive_reports_accession() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("GCA_020379485.1.zip");
        fs::write(&zip_path, b"not a zip").unwrap();

        let err = unpack_archive(&zip_path, &temp.path().join("out")).unwrap_err();
        assert_matches!(err, BatchError::Unpack { ref accession, .. } if accession == "GCA_020379485.1");
    }

    #[test]
    fn verify_names_the_unreadable_archive() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("GCF_000001635.27.zip");
        fs::write(&zip_path, b"PK\x03\x04 truncated").unwrap();

        let err = verify_archive(&zip_path).unwrap_err();
        assert_matches!(
            err,
            BatchError::Unpack { ref accession, ref message }
                if accession == "GCF_000001635.27" && message.starts_with("archive unreadable")
        );

        let good = temp.path().join("GCA_000001405.29.zip");
        write_zip(&good, &[("README.md", &b"readme"[..])]);
        verify_archive(&good).unwrap();
    }
}
