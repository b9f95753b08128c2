//! Size-capped chunk output
//!
//! A [`ChunkSink`] receives batches of normalized records and writes them to
//! a sequence of Parquet parts. A part is closed and uploaded when
//!
//! - its on-disk size reaches the cap (`SizeCap`),
//! - the next batch does not fit its schema (`SchemaMismatch`), or
//! - the stream ends (`EndOfStream`).
//!
//! Parts are named `{stem}.parquet`, `{stem}.part1.parquet`, … in close order
//! and published at `{dataset}/{name}`.

mod sink;

pub use sink::{chunk_name, ChunkOutcome, ChunkSink, ChunkSinkConfig, CloseReason};

/// Default chunk size cap (3 GiB)
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 3 * 1024 * 1024 * 1024;
