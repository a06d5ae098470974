// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # apiload
//!
//! Bounded, cursor-driven extraction from REST APIs into DuckDB or BigQuery.
//!
//! ## Features
//!
//! - **Pagination**: Link header, next URL, cursor token, offset and page number
//! - **Bounded reads**: page and item limits, repeated-cursor detection
//! - **Id-then-detail**: list ids first, then one request per item
//! - **Write modes**: append, replace, and merge on a primary key
//! - **Load packages**: Parquet or JSONL files staged per run before loading
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use apiload::config::PipelineConfig;
//! use apiload::pipeline::RunOptions;
//! use apiload::sources::{require_builtin, run_pipeline};
//!
//! #[tokio::main]
//! async fn main() -> apiload::Result<()> {
//!     let config = PipelineConfig::load(None)?;
//!     let def = require_builtin("hackernews")?;
//!     let result = run_pipeline(def, &config, RunOptions::default()).await?;
//!     println!("Pipeline completed: {result}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────┐   ┌─────────────┐
//! │ PageFetcher  │──▶│ PaginationDriver / │──▶│ RowSink  │──▶│ Destination │
//! │ (one GET)    │   │ DetailDriver       │   │ (package)│   │ DuckDB / BQ │
//! └──────────────┘   └────────────────────┘   └──────────┘   └─────────────┘
//!        │                     │
//!   Paginator            PageLimits
//!   RecordDecoder        StopReason
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Pipeline configuration
pub mod config;

/// Authentication (bearer tokens, service account JWT)
pub mod auth;

/// HTTP client with rate limiting
pub mod http;

/// Pagination strategies
pub mod pagination;

/// Response decoders
pub mod decode;

/// Page fetching and bounded drivers
pub mod extract;

/// Resources and sources
pub mod resource;

/// Load packages, normalization and staged files
pub mod package;

/// Row sink between extraction and destinations
pub mod sink;

/// DuckDB and BigQuery destinations
pub mod destination;

/// Pipeline runs
pub mod pipeline;

/// Built-in pipelines
pub mod sources;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
