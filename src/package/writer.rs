//! Load file writers
//!
//! Writes record buffers to Parquet (via Arrow) or newline-delimited JSON.

use super::schema::records_to_arrow;
use crate::error::Result;
use crate::types::{FileFormat, Record};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Configuration for Parquet load files
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    compression: Compression,
    row_group_size: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: 1024 * 1024,
        }
    }
}

impl ParquetWriterConfig {
    /// Set compression algorithm
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set row group size
    #[must_use]
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    fn build_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }
}

/// Writes one load file per flush
#[derive(Debug, Clone, Default)]
pub struct FileWriter {
    format: FileFormat,
    parquet: ParquetWriterConfig,
}

impl FileWriter {
    /// Create a writer for the given format
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            parquet: ParquetWriterConfig::default(),
        }
    }

    /// Override Parquet settings
    #[must_use]
    pub fn with_parquet_config(mut self, config: ParquetWriterConfig) -> Self {
        self.parquet = config;
        self
    }

    /// File format written
    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Write records to `path`, returning the row count
    pub fn write(&self, path: &Path, records: &[Record]) -> Result<usize> {
        match self.format {
            FileFormat::Parquet => write_parquet(path, records, &self.parquet),
            FileFormat::Jsonl => write_jsonl(path, records),
        }
    }
}

/// Write records to a Parquet file
pub fn write_parquet(path: &Path, records: &[Record], config: &ParquetWriterConfig) -> Result<usize> {
    let batch = records_to_arrow(records)?;
    let file = File::create(path)?;

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(config.build_properties()))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(batch.num_rows())
}

/// Write records as newline-delimited JSON
pub fn write_jsonl(path: &Path, records: &[Record]) -> Result<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(records.len())
}
