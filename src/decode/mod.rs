//! Response decoder module
//!
//! Every supported API answers with JSON. The decoder selects the record
//! list from the response body using a configured path.

mod decoders;
mod types;

pub use decoders::{extract_path, into_records, select_values, value_to_string, JsonDecoder};
pub use types::RecordDecoder;

#[cfg(test)]
mod tests;
