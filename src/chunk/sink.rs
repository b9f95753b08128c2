//! Chunk sink state machine

use super::DEFAULT_MAX_CHUNK_BYTES;
use crate::error::{Error, Result};
use crate::output::{ParquetWriter, ParquetWriterConfig};
use crate::remote::RemoteStore;
use crate::retry::{with_retry, RetryPolicy};
use crate::schema::{check_batch, infer_schema, records_to_batch, resolve_null_columns, BatchFit};
use crate::types::Record;
use arrow::datatypes::SchemaRef;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Why a part was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The part reached the size cap
    SizeCap,
    /// The next batch had a novel field or an incompatible type
    SchemaMismatch,
    /// No more input
    EndOfStream,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SizeCap => "size cap",
            Self::SchemaMismatch => "schema mismatch",
            Self::EndOfStream => "end of stream",
        };
        f.write_str(s)
    }
}

/// A closed (and, outside dry runs, uploaded) part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// File name, e.g. `works.part1.parquet`
    pub name: String,
    /// Remote path, e.g. `works/works.part1.parquet`
    pub remote_path: String,
    /// Rows in the part
    pub rows: usize,
    /// Finalized size in bytes
    pub bytes: u64,
    /// Why the part was closed
    pub reason: CloseReason,
}

/// Where and how parts are written
#[derive(Debug, Clone)]
pub struct ChunkSinkConfig {
    /// Base name of every part
    pub stem: String,
    /// Remote directory parts are published under
    pub dataset: String,
    /// Local directory parts are written to before upload
    pub work_dir: PathBuf,
    /// Close a part once it reaches this many bytes
    pub max_chunk_bytes: u64,
    /// Encode into a byte-counting sink; write and upload nothing
    pub dry_run: bool,
    /// Upload retry policy
    pub retry: RetryPolicy,
    /// Parquet encoding
    pub writer: ParquetWriterConfig,
}

impl ChunkSinkConfig {
    /// Config with default cap, retry and encoding
    pub fn new(stem: impl Into<String>, dataset: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            stem: stem.into(),
            dataset: dataset.into(),
            work_dir: work_dir.into(),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            dry_run: false,
            retry: RetryPolicy::default(),
            writer: ParquetWriterConfig::default(),
        }
    }

    /// Set the size cap
    #[must_use]
    pub fn with_max_chunk_bytes(mut self, bytes: u64) -> Self {
        self.max_chunk_bytes = bytes.max(1);
        self
    }

    /// Enable or disable dry-run mode
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the upload retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Name of part `index`: `{stem}.parquet`, then `{stem}.part{index}.parquet`
pub fn chunk_name(stem: &str, index: usize) -> String {
    if index == 0 {
        format!("{stem}.parquet")
    } else {
        format!("{stem}.part{index}.parquet")
    }
}

struct OpenChunk {
    name: String,
    local_path: Option<PathBuf>,
    schema: SchemaRef,
    writer: ParquetWriter<Box<dyn Write + Send>>,
}

enum State {
    Empty,
    Open(OpenChunk),
}

/// Writes record batches into size-capped, schema-stable Parquet parts
pub struct ChunkSink {
    config: ChunkSinkConfig,
    remote: Arc<dyn RemoteStore>,
    state: State,
    next_index: usize,
    closed: Vec<ChunkOutcome>,
}

impl ChunkSink {
    /// Create a sink publishing through `remote`
    pub fn new(config: ChunkSinkConfig, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            config,
            remote,
            state: State::Empty,
            next_index: 0,
            closed: Vec::new(),
        }
    }

    /// Parts closed so far
    pub fn closed(&self) -> &[ChunkOutcome] {
        &self.closed
    }

    /// True while a part is open
    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Write one batch, rolling over to a new part when needed
    ///
    /// The batch is written as a single row group into a part whose schema
    /// it fits. A part that reaches the size cap afterwards is closed.
    pub async fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let batch_schema = infer_schema(records);

        if let State::Open(chunk) = &self.state {
            if let BatchFit::Mismatch {
                novel_fields,
                conflicting_fields,
            } = check_batch(&chunk.schema, &batch_schema)
            {
                info!(
                    chunk = %chunk.name,
                    novel = ?novel_fields,
                    conflicting = ?conflicting_fields,
                    "Schema changed, rolling over to a new part"
                );
                self.close(CloseReason::SchemaMismatch).await?;
            }
        }

        if matches!(self.state, State::Empty) {
            let schema = Arc::new(resolve_null_columns(&batch_schema));
            self.open(schema)?;
        }

        let State::Open(chunk) = &mut self.state else {
            return Err(Error::output("no open part to write to"));
        };
        let batch = records_to_batch(records, &chunk.schema)?;
        chunk.writer.write_row_group(&batch)?;

        let size = chunk.writer.bytes_written();
        debug!("{}: {} rows, {size} bytes", chunk.name, chunk.writer.rows_written());

        if size >= self.config.max_chunk_bytes {
            self.close(CloseReason::SizeCap).await?;
        }

        Ok(())
    }

    /// Close any open part and return every part in close order
    pub async fn finish(mut self) -> Result<Vec<ChunkOutcome>> {
        if self.is_open() {
            self.close(CloseReason::EndOfStream).await?;
        }
        Ok(self.closed)
    }

    fn open(&mut self, schema: SchemaRef) -> Result<()> {
        let name = chunk_name(&self.config.stem, self.next_index);

        let (target, local_path): (Box<dyn Write + Send>, Option<PathBuf>) = if self.config.dry_run {
            (Box::new(std::io::sink()), None)
        } else {
            std::fs::create_dir_all(&self.config.work_dir)?;
            let path = self.config.work_dir.join(&name);
            (Box::new(std::fs::File::create(&path)?), Some(path))
        };

        let writer = ParquetWriter::from_writer(target, Arc::clone(&schema), &self.config.writer)?;
        debug!("Opened part {name} with {} columns", schema.fields().len());

        self.state = State::Open(OpenChunk {
            name,
            local_path,
            schema,
            writer,
        });
        Ok(())
    }

    /// Finalize, upload and remove the open part
    ///
    /// On upload failure the local file is left in place and the error is
    /// returned.
    async fn close(&mut self, reason: CloseReason) -> Result<()> {
        let State::Open(chunk) = std::mem::replace(&mut self.state, State::Empty) else {
            return Ok(());
        };
        self.next_index += 1;

        let (rows, bytes) = chunk.writer.close()?;
        let remote_path = format!("{}/{}", self.config.dataset, chunk.name);

        match &chunk.local_path {
            None => {
                info!("[dry-run] Would upload {remote_path} ({rows} rows, {bytes} bytes, closed on {reason})");
            }
            Some(local) => {
                let operation = format!("Upload of {remote_path}");
                let remote = &self.remote;
                with_retry(&self.config.retry, &operation, |_| {
                    remote.upload(local, &remote_path)
                })
                .await?;
                tokio::fs::remove_file(local).await?;
                info!("Uploaded {remote_path} ({rows} rows, {bytes} bytes, closed on {reason})");
            }
        }

        self.closed.push(ChunkOutcome {
            name: chunk.name,
            remote_path,
            rows,
            bytes,
            reason,
        });
        Ok(())
    }
}
