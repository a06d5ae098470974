//! Row sink module
//!
//! Bridges extracted batches and destinations. Rows are validated against
//! the table's write mode, normalized, tagged with the load id and staged
//! in the run's load package before the destination applies them.

mod adapter;

pub use adapter::{RowSink, StagedTable, TableSpec, DEFAULT_FLUSH_ROWS, LOAD_ID_COLUMN};

#[cfg(test)]
mod tests;
