//! Record normalization
//!
//! Turns one raw dump line (`type \t key \t revision \t last_modified \t {json}`)
//! into a flat record whose values are all storage scalars.
//!
//! # Overview
//!
//! - `RecordNormalizer` - pure line/value → record transform
//! - `MalformedLines` - bad-line counter with a bounded diagnostic sample
//! - `dataset_name_for` - maps a dump file name to its dataset directory

mod normalizer;

pub use normalizer::{
    dataset_name_for, LineError, MalformedLines, RecordNormalizer, DEFAULT_RICH_TEXT_FIELDS,
};
