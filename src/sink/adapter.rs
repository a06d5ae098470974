//! Row sink adapter
//!
//! Validates and normalizes each batch, stages it in the load package and
//! hands the finished table to a destination.

use crate::destination::Destination;
use crate::error::{Error, Result};
use crate::package::{normalize_identifier, normalize_record, LoadPackage};
use crate::types::{FileFormat, Record, RecordBatch, WriteMode};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Column added to every row with the run's load id
pub const LOAD_ID_COLUMN: &str = "_load_id";

/// Rows buffered before a file is staged
pub const DEFAULT_FLUSH_ROWS: usize = 5_000;

/// Destination table and how to write it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub write_mode: WriteMode,
    pub primary_key: Option<String>,
}

impl TableSpec {
    /// Create a table spec
    pub fn new(name: impl Into<String>, write_mode: WriteMode, primary_key: Option<&str>) -> Self {
        Self {
            name: name.into(),
            write_mode,
            primary_key: primary_key.map(str::to_string),
        }
    }

    /// Same spec with normalized table and key names
    ///
    /// Merge without a primary key is a configuration error.
    pub fn normalized(&self) -> Result<Self> {
        if self.write_mode == WriteMode::Merge && self.primary_key.is_none() {
            return Err(Error::config(format!(
                "Table '{}' uses merge but declares no primary key",
                self.name
            )));
        }
        Ok(Self {
            name: normalize_identifier(&self.name),
            write_mode: self.write_mode,
            primary_key: self.primary_key.as_deref().map(normalize_identifier),
        })
    }
}

/// A table whose rows are staged and ready to load
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTable {
    pub spec: TableSpec,
    pub load_id: String,
    pub format: FileFormat,
    pub files: Vec<PathBuf>,
    pub rows: usize,
}

impl StagedTable {
    /// True if no rows were staged
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Receives record batches for one table
///
/// Merge tables are buffered whole and deduplicated by key, the last
/// occurrence winning; other tables are staged every `flush_rows` rows.
#[derive(Debug)]
pub struct RowSink<'a> {
    spec: TableSpec,
    package: &'a mut LoadPackage,
    buffer: Vec<Record>,
    /// Merge key -> position in `buffer`
    keys: HashMap<String, usize>,
    flush_rows: usize,
    rows: usize,
}

impl<'a> RowSink<'a> {
    /// Open a sink for `spec`, registering the table in the package
    pub fn new(spec: &TableSpec, package: &'a mut LoadPackage) -> Result<Self> {
        let spec = spec.normalized()?;
        package.register_table(&spec.name, spec.write_mode, spec.primary_key.as_deref())?;

        Ok(Self {
            spec,
            package,
            buffer: Vec::new(),
            keys: HashMap::new(),
            flush_rows: DEFAULT_FLUSH_ROWS,
            rows: 0,
        })
    }

    /// Rows buffered before a file is staged
    #[must_use]
    pub fn with_flush_rows(mut self, rows: usize) -> Self {
        self.flush_rows = rows.max(1);
        self
    }

    /// Normalized table spec
    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    /// Rows accepted so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Accept one batch
    pub fn write(&mut self, batch: RecordBatch) -> Result<()> {
        let load_id = Value::String(self.package.load_id().to_string());

        for record in batch {
            let mut row = normalize_record(record);
            let key_value = match &self.spec.primary_key {
                Some(key) => match row.get(key) {
                    Some(value) if !value.is_null() => Some(value.to_string()),
                    _ => {
                        return Err(Error::MissingPrimaryKey {
                            table: self.spec.name.clone(),
                            key: key.clone(),
                        })
                    }
                },
                None => None,
            };
            row.insert(LOAD_ID_COLUMN.to_string(), load_id.clone());

            match key_value {
                Some(key) if self.spec.write_mode == WriteMode::Merge => {
                    match self.keys.get(&key) {
                        Some(&position) => self.buffer[position] = row,
                        None => {
                            self.keys.insert(key, self.buffer.len());
                            self.buffer.push(row);
                        }
                    }
                }
                _ => self.buffer.push(row),
            }
        }

        if self.spec.write_mode != WriteMode::Merge && self.buffer.len() >= self.flush_rows {
            self.flush()?;
        }
        Ok(())
    }

    /// Stage buffered rows as one file
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.buffer);
        self.keys.clear();
        self.package.write_file(&self.spec.name, &rows)?;
        self.rows += rows.len();
        debug!(table = %self.spec.name, rows = self.rows, "Flushed rows");
        Ok(())
    }

    /// Flush remaining rows and describe the staged table
    pub fn finish(mut self) -> Result<StagedTable> {
        self.flush()?;
        Ok(StagedTable {
            files: self.package.table_files(&self.spec.name),
            load_id: self.package.load_id().to_string(),
            format: self.package.file_format(),
            rows: self.rows,
            spec: self.spec,
        })
    }

    /// Finish and load the table into `destination`
    pub async fn load(self, destination: &dyn Destination, dataset: &str) -> Result<StagedTable> {
        let staged = self.finish()?;
        let loaded = destination.load_table(dataset, &staged).await?;
        info!(
            table = %staged.spec.name,
            destination = destination.name(),
            write_mode = %staged.spec.write_mode,
            rows = loaded,
            "Loaded table"
        );
        Ok(staged)
    }
}
