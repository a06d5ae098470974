//! Destination trait and load bookkeeping

use crate::error::Result;
use crate::sink::StagedTable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A finished load, recorded in the destination's `_loads` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadRecord {
    pub load_id: String,
    pub pipeline_name: String,
    pub status: String,
    pub inserted_at: DateTime<Utc>,
}

impl LoadRecord {
    /// A successful load finished now
    pub fn completed(load_id: impl Into<String>, pipeline_name: impl Into<String>) -> Self {
        Self {
            load_id: load_id.into(),
            pipeline_name: pipeline_name.into(),
            status: "completed".to_string(),
            inserted_at: Utc::now(),
        }
    }
}

/// Where staged tables end up
///
/// Each `load_table` call is atomic on its own; a later failure never
/// rolls back a table that already loaded.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Short destination name for logs and run results
    fn name(&self) -> &'static str;

    /// Create the dataset if it does not exist
    async fn prepare(&self, dataset: &str) -> Result<()>;

    /// Apply one staged table with its write mode, returning rows written
    async fn load_table(&self, dataset: &str, table: &StagedTable) -> Result<usize>;

    /// Record a finished load
    async fn complete_load(&self, dataset: &str, load: &LoadRecord) -> Result<()>;
}
