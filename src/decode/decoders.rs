//! JSON decoder and path helpers

use super::types::RecordDecoder;
use crate::error::{Error, Result};
use crate::types::Record;
use serde_json::Value;

// ============================================================================
// JSON Decoder
// ============================================================================

/// JSON decoder with optional record path extraction
///
/// Without a path the whole body is the record list: an array yields its
/// elements, `null` yields nothing and anything else is a single record.
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    record_path: Option<String>,
}

impl JsonDecoder {
    /// Create a new JSON decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON decoder with a record path (e.g. `hits`, `data`,
    /// `results[*].url`)
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            record_path: Some(path.into()),
        }
    }

    /// The configured record path
    pub fn record_path(&self) -> Option<&str> {
        self.record_path.as_deref()
    }
}

impl RecordDecoder for JsonDecoder {
    fn decode(&self, body: &Value) -> Result<Vec<Value>> {
        let selected = match &self.record_path {
            Some(path) => select_values(body, path)?,
            None => vec![body.clone()],
        };

        Ok(selected
            .into_iter()
            .flat_map(|value| match value {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            })
            .collect())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decoded values into records; every value must be an object
pub fn into_records(values: Vec<Value>) -> Result<Vec<Record>> {
    values
        .into_iter()
        .map(|value| match value {
            Value::Object(map) => Ok(map),
            other => Err(Error::malformed(format!(
                "Expected a JSON object record, got {}",
                type_name(&other)
            ))),
        })
        .collect()
}

/// Extract a single value using a dot path with optional indices
///
/// Supports `a.b`, `data[0]` and negative indices such as `data[-1].id`.
/// A leading `$.` is ignored. Wildcards are handled by [`select_values`].
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    let mut current = value;

    for part in path.split('.').filter(|p| !p.is_empty()) {
        let (name, index) = split_index(part);

        if !name.is_empty() {
            current = current.get(name)?;
        }

        if let Some(index) = index {
            let arr = current.as_array()?;
            let idx = resolve_index(index.parse().ok()?, arr.len())?;
            current = arr.get(idx)?;
        }
    }

    Some(current)
}

/// Select values with a record path
///
/// Wildcard paths such as `results[*].url` go through jsonpath-rust; plain
/// dotted paths use [`extract_path`]. Missing fields produce no values.
pub fn select_values(value: &Value, path: &str) -> Result<Vec<Value>> {
    if path.contains('*') && !path.contains("[-") {
        return extract_with_jsonpath(value, path);
    }

    Ok(extract_path(value, path).cloned().into_iter().collect())
}

/// Extract values using jsonpath-rust
fn extract_with_jsonpath(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let query = if path.starts_with('$') {
        path.to_string()
    } else {
        format!("$.{path}")
    };
    let jp = JsonPath::try_from(query.as_str())
        .map_err(|e| Error::config(format!("Invalid record path '{path}': {e}")))?;

    match jp.find(value) {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}

/// Split `name[idx]` into `("name", Some("idx"))`
fn split_index(part: &str) -> (&str, Option<&str>) {
    match (part.find('['), part.strip_suffix(']')) {
        (Some(open), Some(trimmed)) => (&part[..open], Some(&trimmed[open + 1..])),
        _ => (part, None),
    }
}

#[allow(clippy::cast_possible_wrap)]
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let idx = if index < 0 { len as i64 + index } else { index };
    usize::try_from(idx).ok()
}

/// Render a scalar JSON value as a plain string (strings unquoted)
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
