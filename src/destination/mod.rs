//! Destination module
//!
//! Applies staged tables to an analytical store.
//!
//! # Overview
//!
//! - `Destination` - async trait: `prepare`, `load_table`, `complete_load`
//! - `DuckDbDestination` - local DuckDB file (or `:memory:`)
//! - `BigQueryDestination` - BigQuery REST API with service account auth

mod bigquery;
mod duckdb;
mod types;

pub use self::bigquery::{BigQueryDestination, BIGQUERY_SCOPE};
pub use self::duckdb::DuckDbDestination;
pub use self::types::{Destination, LoadRecord};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::types::DestinationType;

/// Open the configured destination for `pipeline_name`
pub fn open_destination(
    kind: DestinationType,
    config: &PipelineConfig,
    pipeline_name: &str,
) -> Result<Box<dyn Destination>> {
    Ok(match kind {
        DestinationType::Duckdb => Box::new(DuckDbDestination::open(
            &config.duckdb_path_for(pipeline_name),
        )?),
        DestinationType::Bigquery => Box::new(BigQueryDestination::from_config(
            &config.bigquery,
            config.http_client_config(),
        )?),
    })
}
