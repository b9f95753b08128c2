//! Parquet file writer
//!
//! Wraps `ArrowWriter` so a chunk can be written batch by batch while its
//! on-disk size is tracked. The target is any `Write + Send`: a file for real
//! runs, `std::io::Sink` for dry runs.

use crate::error::{Error, Result};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Configuration for Parquet writer
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    compression: Compression,
    row_group_size: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: 1024 * 1024, // 1M rows
        }
    }
}

impl ParquetWriterConfig {
    /// Create a new config with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum rows per row group
    #[must_use]
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size.max(1);
        self
    }

    /// Get row group size
    #[must_use]
    pub fn row_group_size(&self) -> usize {
        self.row_group_size
    }

    fn build_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }
}

/// Parquet writer over an arbitrary byte sink
pub struct ParquetWriter<W: Write + Send = File> {
    writer: ArrowWriter<W>,
    rows_written: usize,
}

impl ParquetWriter<File> {
    /// Create (or truncate) a Parquet file at `path`
    pub fn create(
        path: impl AsRef<Path>,
        schema: SchemaRef,
        config: &ParquetWriterConfig,
    ) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(|e| Error::Output {
            message: format!("Failed to create {}: {e}", path.as_ref().display()),
        })?;
        Self::from_writer(file, schema, config)
    }
}

impl<W: Write + Send> ParquetWriter<W> {
    /// Write Parquet into any `Write` target
    pub fn from_writer(target: W, schema: SchemaRef, config: &ParquetWriterConfig) -> Result<Self> {
        let props = config.build_properties();
        let writer = ArrowWriter::try_new(target, schema, Some(props)).map_err(|e| Error::Output {
            message: format!("Failed to create Parquet writer: {e}"),
        })?;

        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    /// Write a RecordBatch; rows are buffered until the row group fills
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer.write(batch).map_err(|e| Error::Output {
            message: format!("Failed to write batch: {e}"),
        })?;

        self.rows_written += batch.num_rows();
        Ok(())
    }

    /// Write a RecordBatch as its own row group
    ///
    /// The row group is flushed immediately so [`bytes_written`](Self::bytes_written)
    /// reflects everything written so far.
    pub fn write_row_group(&mut self, batch: &RecordBatch) -> Result<()> {
        self.write(batch)?;
        self.writer.flush().map_err(|e| Error::Output {
            message: format!("Failed to flush row group: {e}"),
        })
    }

    /// Get the number of rows written so far
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Bytes emitted to the target so far (excludes the footer until close)
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.writer.bytes_written() as u64
    }

    /// Close the writer and finalize the file; returns rows and total bytes
    pub fn close(mut self) -> Result<(usize, u64)> {
        let rows = self.rows_written;
        self.writer.finish().map_err(|e| Error::Output {
            message: format!("Failed to close Parquet writer: {e}"),
        })?;
        let bytes = self.writer.bytes_written() as u64;
        Ok((rows, bytes))
    }
}
