use std::fs;

use assert_matches::assert_matches;

use kira_genome_batch::accessions::{collect_accessions, require_accessions};
use kira_genome_batch::domain::Accession;
use kira_genome_batch::error::BatchError;

fn extract(content: &str) -> Result<Vec<Accession>, BatchError> {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("input.tsv");
    fs::write(&path, content).unwrap();
    require_accessions(&path, collect_accessions(&path, b'\t')?)
}

fn ids(accessions: &[Accession]) -> Vec<&str> {
    accessions.iter().map(|acc| acc.as_str()).collect()
}

#[test]
fn duplicates_collapse_and_invalid_rows_drop() {
    let accessions =
        extract("GCA_020379485.1\nGCF_020379485.1\nGCA_020379485.1\nbad_id\n").unwrap();
    assert_eq!(ids(&accessions), vec!["GCA_020379485.1", "GCF_020379485.1"]);
}

#[test]
fn header_dropped_regardless_of_other_columns() {
    let accessions = extract(
        "Assembly Accession\tName\tGCF_000005845.2\n\
         GCA_000001405.29\tGRCh38\n",
    )
    .unwrap();
    assert_eq!(ids(&accessions), vec!["GCA_000001405.29"]);
}

#[test]
fn output_is_sorted_and_unique() {
    let accessions = extract(
        "GCF_000001635.27\tmouse\r\n\
         GCA_000001405.29\thuman\r\n \
         GCF_000001635.27 \tmouse again\r\n\
         GCA_000001215.4\tfly\r\n",
    )
    .unwrap();
    let values = ids(&accessions);
    let mut sorted = values.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(values, sorted);
    assert_eq!(values.len(), 3);
}

#[test]
fn only_column_one_is_considered() {
    assert_matches!(
        extract("name\tGCF_000005845.2\n"),
        Err(BatchError::NoValidAccessions(_))
    );
}

#[test]
fn version_suffix_is_required() {
    assert_matches!(
        extract("GCF_000005845\nGCA_\nGCX_000005845.2\n"),
        Err(BatchError::NoValidAccessions(_))
    );
}
