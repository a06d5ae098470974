//! Load package on disk
//!
//! One package per run: `<pipelines_dir>/<pipeline>/load/<load_id>/` holding
//! the staged files of every table plus a `package.json` manifest.

use super::writer::FileWriter;
use crate::error::{Error, Result, ResultExt};
use crate::types::{FileFormat, Record, WriteMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the manifest file inside a package directory
pub const MANIFEST_FILE: &str = "package.json";

/// Load id for a run started at `now`: `"<unix seconds>.<micros>"`
pub fn new_load_id(now: DateTime<Utc>) -> String {
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

// ============================================================================
// Manifest
// ============================================================================

/// Package lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Extracting,
    Loaded,
    Failed,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageStatus::Extracting => f.write_str("extracting"),
            PackageStatus::Loaded => f.write_str("loaded"),
            PackageStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Files staged for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableManifest {
    pub name: String,
    pub write_mode: WriteMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// File names relative to the package directory
    pub files: Vec<String>,
    pub rows: usize,
}

/// Contents of `package.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub load_id: String,
    pub pipeline_name: String,
    pub dataset_name: String,
    pub file_format: FileFormat,
    pub status: PackageStatus,
    pub created_at: DateTime<Utc>,
    pub tables: Vec<TableManifest>,
}

// ============================================================================
// Load Package
// ============================================================================

/// A run's staging directory
#[derive(Debug)]
pub struct LoadPackage {
    dir: PathBuf,
    manifest: PackageManifest,
    writer: FileWriter,
    next_seq: HashMap<String, u32>,
}

impl LoadPackage {
    /// Create the package directory and write the initial manifest
    pub fn create(
        pipelines_dir: &Path,
        pipeline_name: &str,
        dataset_name: &str,
        file_format: FileFormat,
    ) -> Result<Self> {
        let created_at = Utc::now();
        let load_id = new_load_id(created_at);
        let dir = pipelines_dir.join(pipeline_name).join("load").join(&load_id);

        if dir.exists() {
            return Err(Error::package(format!(
                "Load package {} already exists",
                dir.display()
            )));
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create load package {}", dir.display()))?;

        let package = Self {
            dir,
            manifest: PackageManifest {
                load_id,
                pipeline_name: pipeline_name.to_string(),
                dataset_name: dataset_name.to_string(),
                file_format,
                status: PackageStatus::Extracting,
                created_at,
                tables: Vec::new(),
            },
            writer: FileWriter::new(file_format),
            next_seq: HashMap::new(),
        };
        package.save_manifest()?;

        debug!(load_id = %package.load_id(), path = %package.dir.display(), "Created load package");
        Ok(package)
    }

    /// Read the manifest of an existing package directory
    pub fn read_manifest(dir: &Path) -> Result<PackageManifest> {
        let path = dir.join(MANIFEST_FILE);
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Load id of this package
    pub fn load_id(&self) -> &str {
        &self.manifest.load_id
    }

    /// Package directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Format of staged files
    pub fn file_format(&self) -> FileFormat {
        self.writer.format()
    }

    /// Current manifest
    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Add a table to the manifest; re-registering keeps existing files
    pub fn register_table(&mut self, name: &str, write_mode: WriteMode, primary_key: Option<&str>) -> Result<()> {
        if !self.manifest.tables.iter().any(|t| t.name == name) {
            self.manifest.tables.push(TableManifest {
                name: name.to_string(),
                write_mode,
                primary_key: primary_key.map(str::to_string),
                files: Vec::new(),
                rows: 0,
            });
            self.save_manifest()?;
        }
        Ok(())
    }

    /// Stage one file of rows for `table`, returning its path
    pub fn write_file(&mut self, table: &str, records: &[Record]) -> Result<PathBuf> {
        let seq = self.next_seq.entry(table.to_string()).or_insert(0);
        let file_name = format!("{table}.{seq:05}.{}", self.writer.format().extension());
        *seq += 1;

        let path = self.dir.join(&file_name);
        let rows = self.writer.write(&path, records)?;

        let entry = self
            .manifest
            .tables
            .iter_mut()
            .find(|t| t.name == table)
            .ok_or_else(|| Error::package(format!("Table '{table}' is not registered")))?;
        entry.files.push(file_name);
        entry.rows += rows;
        self.save_manifest()?;

        debug!(table = %table, rows, file = %path.display(), "Staged load file");
        Ok(path)
    }

    /// Absolute paths of the files staged for `table`
    pub fn table_files(&self, table: &str) -> Vec<PathBuf> {
        self.manifest
            .tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.files.iter().map(|f| self.dir.join(f)).collect())
            .unwrap_or_default()
    }

    /// Update the package status on disk
    pub fn mark(&mut self, status: PackageStatus) -> Result<()> {
        self.manifest.status = status;
        self.save_manifest()
    }

    /// Delete the package directory
    pub fn remove(self) -> Result<()> {
        std::fs::remove_dir_all(&self.dir)
            .with_context(|| format!("Failed to remove load package {}", self.dir.display()))?;
        debug!(load_id = %self.manifest.load_id, "Removed load package");
        Ok(())
    }

    /// Write the manifest through a temp file and rename
    fn save_manifest(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.manifest)?;
        let path = self.dir.join(MANIFEST_FILE);
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }
}
