//! CLI module
//!
//! Command-line interface for running built-in pipelines.
//!
//! # Commands
//!
//! - `run <PIPELINE> [PARTITION_KEY]` - Extract and load one pipeline
//! - `list` - List built-in pipelines

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
