//! Decoder types and traits

use crate::error::Result;
use serde_json::Value;

/// Trait for pulling records out of a decoded response body
pub trait RecordDecoder: Send + Sync {
    /// Select the record values from the full response body
    fn decode(&self, body: &Value) -> Result<Vec<Value>>;
}
