//! Load package module
//!
//! Stages normalized rows on disk before they reach a destination.
//!
//! # Overview
//!
//! This module provides:
//! - Identifier normalization for tables and columns
//! - Arrow schema inference from JSON records
//! - Parquet and JSONL load file writers
//! - `LoadPackage`, the per-run directory with its `package.json` manifest

mod load;
mod naming;
mod schema;
mod writer;

pub use load::{
    new_load_id, LoadPackage, PackageManifest, PackageStatus, TableManifest, MANIFEST_FILE,
};
pub use naming::{normalize_identifier, normalize_record};
pub use schema::{infer_schema, records_to_arrow};
pub use writer::{write_jsonl, write_parquet, FileWriter, ParquetWriterConfig};
