//! Schema tracking
//!
//! Derives Arrow schemas from normalized records, decides whether a new batch
//! fits the schema of the chunk it is about to be written into, and encodes
//! records as `RecordBatch`es aligned to a given schema.
//!
//! # Features
//!
//! - **Type Inference**: one column type per field, from the runtime JSON types
//! - **Conflict Fallback**: mixed types within a batch fall back to `Utf8`
//! - **Batch Fit**: novel fields or incompatible types are reported as a
//!   mismatch instead of being cast or dropped
//! - **Alignment**: missing fields are filled with nulls

mod convert;
mod inference;

pub use convert::{align_batch, records_to_batch};
pub use inference::{check_batch, infer_schema, merge_schemas, resolve_null_columns, BatchFit};
