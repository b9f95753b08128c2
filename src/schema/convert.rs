//! Record → RecordBatch encoding and batch alignment

use crate::error::Result;
use crate::types::{JsonValue, Record};
use arrow::array::{new_null_array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

/// Encode records as a RecordBatch with exactly the given schema
///
/// Columns follow schema order; a record without a field gets a null.
/// Fields not in the schema are ignored, so callers must run
/// [`check_batch`](super::check_batch) first if dropping is not acceptable.
pub fn records_to_batch(records: &[Record], schema: &SchemaRef) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        let values: Vec<Option<&JsonValue>> = records
            .iter()
            .map(|record| record.get(field.name()).filter(|v| !v.is_null()))
            .collect();

        columns.push(build_array(&values, field.data_type()));
    }

    let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        columns,
        &options,
    )?)
}

/// Reshape a batch to a target schema: reorder, cast, and pad with nulls
pub fn align_batch(batch: &RecordBatch, target: &SchemaRef) -> Result<RecordBatch> {
    let source = batch.schema();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(target.fields().len());

    for field in target.fields() {
        let column = match source.index_of(field.name()) {
            Ok(idx) => {
                let column = batch.column(idx);
                if column.data_type() == field.data_type() {
                    Arc::clone(column)
                } else {
                    cast(column, field.data_type())?
                }
            }
            Err(_) => new_null_array(field.data_type(), batch.num_rows()),
        };
        columns.push(column);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(target),
        columns,
        &options,
    )?)
}

/// Build an Arrow array from JSON scalars
fn build_array(values: &[Option<&JsonValue>], data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Boolean => {
            let arr: BooleanArray = values
                .iter()
                .map(|v| v.and_then(JsonValue::as_bool))
                .collect();
            Arc::new(arr)
        }

        DataType::Int64 => {
            let arr: Int64Array = values
                .iter()
                .map(|v| v.and_then(JsonValue::as_i64))
                .collect();
            Arc::new(arr)
        }

        DataType::Float64 => {
            let arr: Float64Array = values
                .iter()
                .map(|v| v.and_then(JsonValue::as_f64))
                .collect();
            Arc::new(arr)
        }

        DataType::Null => new_null_array(&DataType::Null, values.len()),

        // Utf8, and anything unexpected, as text
        _ => {
            let arr: StringArray = values
                .iter()
                .map(|v| {
                    v.map(|v| match v {
                        JsonValue::String(s) => s.clone(),
                        _ => v.to_string(),
                    })
                })
                .collect();
            Arc::new(arr)
        }
    }
}
