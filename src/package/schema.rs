//! Arrow schema inference and record to Arrow conversion
//!
//! Columns keep the order in which they were first seen. Structs and lists
//! merge recursively; columns that are null everywhere are stored as text.

use crate::error::{Error, Result};
use crate::types::Record;
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, ListArray, StringArray, StructArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Infer an Arrow schema from a set of records
pub fn infer_schema(records: &[Record]) -> Schema {
    let mut columns = ColumnTypes::default();
    for record in records {
        columns.observe(record);
    }
    Schema::new(columns.into_fields())
}

/// Convert records to an Arrow RecordBatch using an inferred schema
pub fn records_to_arrow(records: &[Record]) -> Result<RecordBatch> {
    let schema = Arc::new(infer_schema(records));

    if records.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            let values: Vec<Option<&Value>> =
                records.iter().map(|record| record.get(field.name())).collect();
            build_array(&values, field.data_type())
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RecordBatch::try_new(schema, columns)?)
}

// ============================================================================
// Inference
// ============================================================================

/// Column types in first-seen order
#[derive(Default)]
struct ColumnTypes {
    order: Vec<String>,
    types: HashMap<String, DataType>,
}

impl ColumnTypes {
    fn observe(&mut self, object: &serde_json::Map<String, Value>) {
        for (key, value) in object {
            let inferred = infer_type(value);
            match self.types.get_mut(key) {
                Some(existing) => *existing = merge_types(existing, &inferred),
                None => {
                    self.order.push(key.clone());
                    self.types.insert(key.clone(), inferred);
                }
            }
        }
    }

    fn into_fields(mut self) -> Vec<Field> {
        self.order
            .iter()
            .filter_map(|name| {
                self.types
                    .remove(name)
                    .map(|dtype| Field::new(name, finalize(dtype), true))
            })
            .collect()
    }
}

/// Infer an Arrow DataType from a JSON value
fn infer_type(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::Null,
        Value::Bool(_) => DataType::Boolean,
        Value::Number(n) => {
            if n.is_i64() {
                DataType::Int64
            } else {
                DataType::Float64
            }
        }
        Value::String(_) => DataType::Utf8,
        Value::Array(items) => {
            let element = items
                .iter()
                .map(infer_type)
                .reduce(|a, b| merge_types(&a, &b))
                .unwrap_or(DataType::Null);
            list_of(element)
        }
        Value::Object(object) => {
            let mut columns = ColumnTypes::default();
            columns.observe(object);
            let fields: Vec<Field> = columns
                .order
                .iter()
                .filter_map(|name| {
                    columns
                        .types
                        .get(name)
                        .map(|dtype| Field::new(name, dtype.clone(), true))
                })
                .collect();
            DataType::Struct(Fields::from(fields))
        }
    }
}

/// Merge two data types into a compatible type
fn merge_types(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a.clone(),

        (DataType::Null, other) | (other, DataType::Null) => other.clone(),

        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }

        (DataType::List(a), DataType::List(b)) => list_of(merge_types(a.data_type(), b.data_type())),

        (DataType::Struct(a), DataType::Struct(b)) => {
            let mut merged: Vec<Field> = a.iter().map(|f| f.as_ref().clone()).collect();
            for field in b {
                match merged.iter_mut().find(|f| f.name() == field.name()) {
                    Some(existing) => {
                        let dtype = merge_types(existing.data_type(), field.data_type());
                        *existing = Field::new(field.name(), dtype, true);
                    }
                    None => merged.push(field.as_ref().clone()),
                }
            }
            DataType::Struct(Fields::from(merged))
        }

        // Conflicting types are stored as text
        _ => DataType::Utf8,
    }
}

/// Replace leftover nulls and empty structs with text
fn finalize(dtype: DataType) -> DataType {
    match dtype {
        DataType::Null => DataType::Utf8,
        DataType::List(field) => list_of(finalize(field.data_type().clone())),
        DataType::Struct(fields) if fields.is_empty() => DataType::Utf8,
        DataType::Struct(fields) => DataType::Struct(Fields::from(
            fields
                .iter()
                .map(|f| Field::new(f.name(), finalize(f.data_type().clone()), true))
                .collect::<Vec<_>>(),
        )),
        other => other,
    }
}

fn list_of(element: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", element, true)))
}

// ============================================================================
// Array Building
// ============================================================================

/// Build an Arrow array from JSON values
fn build_array(values: &[Option<&Value>], data_type: &DataType) -> Result<ArrayRef> {
    let values: Vec<Option<&Value>> = values
        .iter()
        .map(|v| v.filter(|v| !v.is_null()))
        .collect();

    match data_type {
        DataType::Boolean => {
            let arr: BooleanArray = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Int64 => {
            let arr: Int64Array = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Float64 => {
            let arr: Float64Array = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
            Ok(Arc::new(arr))
        }

        DataType::List(field) => build_list_array(&values, field),

        DataType::Struct(fields) => build_struct_array(&values, fields),

        // Text, including values whose types conflicted
        _ => {
            let arr: StringArray = values
                .iter()
                .map(|v| {
                    v.map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                })
                .collect();
            Ok(Arc::new(arr))
        }
    }
}

/// Build a list array from JSON arrays
fn build_list_array(values: &[Option<&Value>], field: &Arc<Field>) -> Result<ArrayRef> {
    let mut items: Vec<Option<&Value>> = Vec::new();
    let mut offsets: Vec<i32> = vec![0];
    let mut valid: Vec<bool> = Vec::with_capacity(values.len());

    for value in values {
        match value {
            Some(Value::Array(array)) => {
                items.extend(array.iter().map(Some));
                valid.push(true);
            }
            // A scalar in a list column is kept as a one element list
            Some(other) => {
                items.push(Some(other));
                valid.push(true);
            }
            None => valid.push(false),
        }
        let offset = i32::try_from(items.len())
            .map_err(|_| Error::package("List column too large for i32 offsets"))?;
        offsets.push(offset);
    }

    let child = build_array(&items, field.data_type())?;
    let list = ListArray::try_new(
        Arc::clone(field),
        OffsetBuffer::new(offsets.into()),
        child,
        Some(NullBuffer::from(valid)),
    )?;
    Ok(Arc::new(list))
}

/// Build a struct array from JSON objects
fn build_struct_array(values: &[Option<&Value>], fields: &Fields) -> Result<ArrayRef> {
    let children = fields
        .iter()
        .map(|field| {
            let child: Vec<Option<&Value>> = values
                .iter()
                .map(|v| match v {
                    Some(Value::Object(object)) => object.get(field.name()),
                    _ => None,
                })
                .collect();
            build_array(&child, field.data_type())
        })
        .collect::<Result<Vec<_>>>()?;

    let valid: Vec<bool> = values
        .iter()
        .map(|v| matches!(v, Some(Value::Object(_))))
        .collect();

    let array = StructArray::try_new(fields.clone(), children, Some(NullBuffer::from(valid)))?;
    Ok(Arc::new(array))
}
