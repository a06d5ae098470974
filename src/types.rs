//! Common types used throughout apiload
//!
//! Records, batches and the small enums shared by the extract, sink and
//! destination layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// One loosely-typed record. Key order follows the upstream payload.
pub type Record = serde_json::Map<String, JsonValue>;

// ============================================================================
// Record Batch
// ============================================================================

/// Ordered records returned by one page (or one detail request)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    records: Vec<Record>,
}

impl RecordBatch {
    /// Create a batch from records
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Number of records in the batch
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Borrow the records
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Keep at most `n` records
    pub fn truncate(&mut self, n: usize) {
        self.records.truncate(n);
    }

    /// Consume the batch
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl From<Vec<Record>> for RecordBatch {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl IntoIterator for RecordBatch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

// ============================================================================
// Write Mode
// ============================================================================

/// How a table's rows are written to the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Insert every row, no deduplication
    #[default]
    Append,
    /// The table holds only this run's rows afterwards
    Replace,
    /// Upsert keyed by the declared primary key
    Merge,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Replace => "replace",
            WriteMode::Merge => "merge",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "replace" => Ok(WriteMode::Replace),
            "merge" => Ok(WriteMode::Merge),
            other => Err(crate::Error::invalid_value(
                "write_disposition",
                format!("unknown write disposition '{other}'"),
            )),
        }
    }
}

// ============================================================================
// File Format
// ============================================================================

/// Format of the files staged in a load package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Parquet,
    Jsonl,
}

impl FileFormat {
    /// File extension used for staged files
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Parquet => "parquet",
            FileFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for FileFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(FileFormat::Parquet),
            "jsonl" => Ok(FileFormat::Jsonl),
            other => Err(crate::Error::invalid_value(
                "file_format",
                format!("unknown loader file format '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Destination Type
// ============================================================================

/// Supported destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    #[default]
    Duckdb,
    Bigquery,
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationType::Duckdb => f.write_str("duckdb"),
            DestinationType::Bigquery => f.write_str("bigquery"),
        }
    }
}

impl FromStr for DestinationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckdb" => Ok(DestinationType::Duckdb),
            "bigquery" => Ok(DestinationType::Bigquery),
            other => Err(crate::Error::invalid_value(
                "destination_type",
                format!("unsupported destination '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.trim().is_empty())
    }
}

impl OptionStringExt for String {
    fn none_if_empty(self) -> Option<String> {
        if self.trim().is_empty() {
            None
        } else {
            Some(self)
        }
    }
}
