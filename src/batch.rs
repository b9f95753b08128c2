//! In-memory record batching
//!
//! Buffers normalized records in source order until a row-count (or optional
//! approximate byte-size) threshold is hit, then hands the whole group over
//! for columnar encoding.

use crate::types::Record;

/// Default number of rows per batch
pub const DEFAULT_BATCH_ROWS: usize = 100_000;

/// Accumulates records for one batch
#[derive(Debug, Clone)]
pub struct BatchWriter {
    records: Vec<Record>,
    max_rows: usize,
    max_bytes: Option<usize>,
    approx_bytes: usize,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_ROWS)
    }
}

impl BatchWriter {
    /// Flush every `max_rows` records
    pub fn new(max_rows: usize) -> Self {
        Self {
            records: Vec::new(),
            max_rows: max_rows.max(1),
            max_bytes: None,
            approx_bytes: 0,
        }
    }

    /// Also flush once the buffered source text reaches `max_bytes`
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: Option<usize>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Buffer a record; `source_len` is the length of the line it came from
    pub fn push(&mut self, record: Record, source_len: usize) {
        self.records.push(record);
        self.approx_bytes += source_len;
    }

    /// True once a threshold has been reached
    pub fn should_flush(&self) -> bool {
        self.records.len() >= self.max_rows
            || self.max_bytes.is_some_and(|max| self.approx_bytes >= max)
    }

    /// Take the buffered records in insertion order, leaving the buffer empty
    pub fn take_batch(&mut self) -> Vec<Record> {
        self.approx_bytes = 0;
        std::mem::replace(&mut self.records, Vec::with_capacity(self.max_rows.min(1 << 16)))
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Row threshold
    pub fn max_rows(&self) -> usize {
        self.max_rows
    }
}
