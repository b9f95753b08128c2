//! Arrow schema inference and compatibility checks

use crate::types::{JsonValue, Record};
use arrow::datatypes::{DataType, Field, Schema};
use std::collections::HashMap;

/// Infer an Arrow schema from a batch of normalized records
///
/// Field order is first-seen order. A field that is null in every record is
/// typed `Null`; see [`resolve_null_columns`].
pub fn infer_schema(records: &[Record]) -> Schema {
    let mut order: Vec<String> = Vec::new();
    let mut field_types: HashMap<String, DataType> = HashMap::new();

    for record in records {
        for (key, value) in record {
            let inferred = infer_type(value);
            match field_types.get_mut(key) {
                Some(existing) => *existing = merge_types(existing, &inferred),
                None => {
                    order.push(key.clone());
                    field_types.insert(key.clone(), inferred);
                }
            }
        }
    }

    let fields: Vec<Field> = order
        .into_iter()
        .map(|name| {
            let dtype = field_types.remove(&name).unwrap_or(DataType::Null);
            Field::new(name, dtype, true)
        })
        .collect();

    Schema::new(fields)
}

/// Replace `Null` columns with `Utf8` so the schema can be written to Parquet
/// and later batches can fill the column
pub fn resolve_null_columns(schema: &Schema) -> Schema {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| match f.data_type() {
            DataType::Null => Field::new(f.name(), DataType::Utf8, true),
            _ => f.as_ref().clone(),
        })
        .collect();

    Schema::new(fields)
}

/// Merge two schemas into their ordered union
///
/// Fields of `schema1` keep their position; new fields from `schema2` are
/// appended. Shared fields get the merged type.
pub fn merge_schemas(schema1: &Schema, schema2: &Schema) -> Schema {
    let mut fields: Vec<Field> = schema1.fields().iter().map(|f| f.as_ref().clone()).collect();

    for field in schema2.fields() {
        if let Some(existing) = fields.iter_mut().find(|f| f.name() == field.name()) {
            let merged_type = merge_types(existing.data_type(), field.data_type());
            *existing = Field::new(
                existing.name(),
                merged_type,
                existing.is_nullable() || field.is_nullable(),
            );
        } else {
            fields.push(field.as_ref().clone());
        }
    }

    Schema::new(fields)
}

/// Whether a batch can be written into a chunk without changing its schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFit {
    /// Every batch column maps onto a chunk column
    Fits,
    /// The batch needs a different schema; the chunk must roll over
    Mismatch {
        /// Fields the chunk schema does not have
        novel_fields: Vec<String>,
        /// Fields whose batch type the chunk column cannot hold
        conflicting_fields: Vec<String>,
    },
}

impl BatchFit {
    /// True if the batch can go into the current chunk
    pub fn fits(&self) -> bool {
        matches!(self, Self::Fits)
    }
}

/// Check a batch schema against the schema of the open chunk
///
/// Fields missing from the batch are fine (they are written as nulls).
pub fn check_batch(chunk: &Schema, batch: &Schema) -> BatchFit {
    let mut novel_fields = Vec::new();
    let mut conflicting_fields = Vec::new();

    for field in batch.fields() {
        match chunk.field_with_name(field.name()) {
            Ok(column) => {
                if !column_accepts(column.data_type(), field.data_type()) {
                    conflicting_fields.push(field.name().clone());
                }
            }
            Err(_) => novel_fields.push(field.name().clone()),
        }
    }

    if novel_fields.is_empty() && conflicting_fields.is_empty() {
        BatchFit::Fits
    } else {
        BatchFit::Mismatch {
            novel_fields,
            conflicting_fields,
        }
    }
}

/// Can a column of type `column` hold values inferred as `incoming`?
fn column_accepts(column: &DataType, incoming: &DataType) -> bool {
    match (column, incoming) {
        (_, DataType::Null) => true,
        (a, b) if a == b => true,
        (DataType::Float64, DataType::Int64) => true,
        // same fallback as an in-batch conflict
        (DataType::Utf8, _) => true,
        _ => false,
    }
}

/// Infer Arrow DataType from a JSON value
fn infer_type(value: &JsonValue) -> DataType {
    match value {
        JsonValue::Null => DataType::Null,
        JsonValue::Bool(_) => DataType::Boolean,
        JsonValue::Number(n) => {
            if n.is_i64() {
                DataType::Int64
            } else {
                DataType::Float64
            }
        }
        // normalized records hold no nested values; stringify if one slips through
        JsonValue::String(_) | JsonValue::Array(_) | JsonValue::Object(_) => DataType::Utf8,
    }
}

/// Merge two data types into a compatible type
pub(crate) fn merge_types(type1: &DataType, type2: &DataType) -> DataType {
    match (type1, type2) {
        (a, b) if a == b => a.clone(),

        // Null can merge with anything
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),

        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }

        _ => DataType::Utf8,
    }
}
