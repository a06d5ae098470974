//! Pipeline run types

use crate::extract::StopReason;
use crate::types::WriteMode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Per-run options from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Opaque partition key; logged and echoed in the result
    pub partition_key: Option<String>,
}

impl RunOptions {
    /// Set the partition key
    #[must_use]
    pub fn with_partition_key(mut self, key: Option<String>) -> Self {
        self.partition_key = key;
        self
    }
}

/// What happened to one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableLoadInfo {
    pub table: String,
    pub write_mode: WriteMode,
    pub rows: usize,
    pub pages: u32,
    pub stop_reason: Option<StopReason>,
}

impl fmt::Display for TableLoadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} rows, {} pages",
            self.table, self.write_mode, self.rows, self.pages
        )?;
        if let Some(reason) = self.stop_reason {
            write!(f, ", {reason}")?;
        }
        f.write_str(")")
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub pipeline_name: String,
    pub destination: String,
    pub dataset_name: String,
    pub load_ids: Vec<String>,
    pub partition_key: Option<String>,
    pub tables: Vec<TableLoadInfo>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Rows loaded across all tables
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// Load info for one table
    pub fn table(&self, name: &str) -> Option<&TableLoadInfo> {
        self.tables.iter().find(|t| t.table == name)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline {} load step completed in {:.2}s: {} rows into {} dataset {}",
            self.pipeline_name,
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0,
            self.total_rows(),
            self.destination,
            self.dataset_name,
        )?;
        if let Some(key) = &self.partition_key {
            write!(f, " (partition {key})")?;
        }
        write!(f, "; load ids [{}]", self.load_ids.join(", "))?;
        for table in &self.tables {
            write!(f, "\n  - {table}")?;
        }
        Ok(())
    }
}
