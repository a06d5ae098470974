//! Identifier normalization
//!
//! Table and column names become lower snake_case.

use crate::types::Record;
use serde_json::Value;

/// Normalize one identifier
///
/// `AnnualRevenue` -> `annual_revenue`, `objectID` -> `object_id`,
/// `+1` -> `plus_1`, `-1` -> `minus_1`, `3d` -> `_3d`.
pub fn normalize_identifier(name: &str) -> String {
    let trimmed = name.trim();
    let signed = if let Some(rest) = trimmed.strip_prefix('+') {
        format!("plus_{rest}")
    } else if let Some(rest) = trimmed.strip_prefix('-') {
        format!("minus_{rest}")
    } else {
        trimmed.to_string()
    };

    let chars: Vec<char> = signed.chars().collect();
    let mut ident = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next_is_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            let boundary = prev.is_some_and(|p| {
                p.is_ascii_lowercase()
                    || p.is_ascii_digit()
                    || (p.is_ascii_uppercase() && next_is_lower)
            });
            if boundary {
                ident.push('_');
            }
            ident.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            ident.push(c);
        } else if !ident.ends_with('_') {
            ident.push('_');
        }
    }

    // camel case boundaries can land next to existing separators
    while ident.contains("__") {
        ident = ident.replace("__", "_");
    }
    let mut ident = ident.trim_end_matches('_').to_string();
    if ident.is_empty() {
        return "_".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// Normalize every key of a record, recursing into nested objects
///
/// Keys that collide after normalization get `_2`, `_3`, ... suffixes in
/// the order they appear.
pub fn normalize_record(record: Record) -> Record {
    let mut out = Record::with_capacity(record.len());
    for (key, value) in record {
        let base = normalize_identifier(&key);
        let mut name = base.clone();
        let mut n = 2;
        while out.contains_key(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        out.insert(name, normalize_value(value));
    }
    out
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(normalize_record(object)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}
