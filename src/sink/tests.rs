//! Tests for the sink module

use super::*;
use crate::error::Error;
use crate::package::LoadPackage;
use crate::types::{FileFormat, Record, RecordBatch, WriteMode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

fn batch(rows: Value) -> RecordBatch {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect::<Vec<Record>>()
        .into()
}

fn package() -> (TempDir, LoadPackage) {
    let dir = tempfile::tempdir().unwrap();
    let package = LoadPackage::create(dir.path(), "sink_test", "data", FileFormat::Jsonl).unwrap();
    (dir, package)
}

fn staged_rows(table: &StagedTable) -> Vec<Value> {
    table
        .files
        .iter()
        .flat_map(|f| {
            std::fs::read_to_string(f)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str::<Value>(l).unwrap())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn test_merge_requires_primary_key() {
    let (_dir, mut package) = package();
    let spec = TableSpec::new("issues", WriteMode::Merge, None);
    let err = RowSink::new(&spec, &mut package).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[test]
fn test_spec_is_normalized() {
    let spec = TableSpec::new("dltHub Issues", WriteMode::Merge, Some("Id"));
    let normalized = spec.normalized().unwrap();
    assert_eq!(normalized.name, "dlt_hub_issues");
    assert_eq!(normalized.primary_key.as_deref(), Some("id"));
}

#[test]
fn test_missing_or_null_key_is_rejected() {
    let (_dir, mut package) = package();
    let spec = TableSpec::new("commits", WriteMode::Append, Some("sha"));
    let mut sink = RowSink::new(&spec, &mut package).unwrap();

    let err = sink.write(batch(json!([{"message": "x"}]))).unwrap_err();
    assert!(matches!(err, Error::MissingPrimaryKey { ref table, ref key } if table == "commits" && key == "sha"));

    let err = sink.write(batch(json!([{"sha": null}]))).unwrap_err();
    assert!(matches!(err, Error::MissingPrimaryKey { .. }));
}

#[test]
fn test_rows_are_normalized_and_tagged() {
    let (_dir, mut package) = package();
    let load_id = package.load_id().to_string();
    let spec = TableSpec::new("accounts", WriteMode::Merge, Some("Id"));
    let mut sink = RowSink::new(&spec, &mut package).unwrap();

    sink.write(batch(json!([{"Id": "001", "AnnualRevenue": 10}])))
        .unwrap();
    let staged = sink.finish().unwrap();

    assert_eq!(staged.spec.name, "accounts");
    assert_eq!(staged.spec.primary_key.as_deref(), Some("id"));
    assert_eq!(staged.load_id, load_id);
    assert_eq!(
        staged_rows(&staged),
        vec![json!({"id": "001", "annual_revenue": 10, "_load_id": load_id})]
    );
}

#[test]
fn test_flush_threshold_stages_multiple_files() {
    let (_dir, mut package) = package();
    let spec = TableSpec::new("commits", WriteMode::Append, Some("sha"));
    let mut sink = RowSink::new(&spec, &mut package).unwrap().with_flush_rows(2);

    sink.write(batch(json!([{"sha": "a"}, {"sha": "b"}]))).unwrap();
    sink.write(batch(json!([{"sha": "c"}]))).unwrap();
    assert_eq!(sink.rows(), 2);

    let staged = sink.finish().unwrap();
    assert_eq!(staged.files.len(), 2);
    assert_eq!(staged.rows, 3);
    assert_eq!(staged.format, FileFormat::Jsonl);
}

#[test]
fn test_merge_keeps_last_occurrence() {
    let (_dir, mut package) = package();
    let spec = TableSpec::new("issues", WriteMode::Merge, Some("id"));
    let mut sink = RowSink::new(&spec, &mut package).unwrap().with_flush_rows(1);

    sink.write(batch(json!([{"id": 1, "title": "a"}, {"id": 2, "title": "b"}])))
        .unwrap();
    sink.write(batch(json!([{"id": 1, "title": "a2"}]))).unwrap();

    let staged = sink.finish().unwrap();
    assert_eq!(staged.files.len(), 1);
    assert_eq!(staged.rows, 2);

    let titles: Vec<Value> = staged_rows(&staged)
        .into_iter()
        .map(|r| r["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("a2"), json!("b")]);
}

#[test]
fn test_empty_table_stages_nothing() {
    let (_dir, mut package) = package();
    let spec = TableSpec::new("best_stories", WriteMode::Replace, Some("id"));
    let sink = RowSink::new(&spec, &mut package).unwrap();

    let staged = sink.finish().unwrap();
    assert!(staged.is_empty());
    assert!(staged.files.is_empty());
    assert_eq!(package.manifest().tables.len(), 1);
}
