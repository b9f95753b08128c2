//! Source dump reading
//!
//! Dumps are gzip files (possibly multi-member) of newline-delimited text.
//! Uncompressed files are read as-is. Decoding runs on the blocking pool and
//! hands lines to the converter in blocks over a bounded channel.

use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryPolicy};
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER_BYTES: usize = 1024 * 1024;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Lines sent to the converter per message
const LINES_PER_BLOCK: usize = 4096;

/// Blocks buffered between the reader and the converter
const BLOCK_CHANNEL_DEPTH: usize = 8;

/// A decoded text stream
pub type SourceReader = Box<dyn BufRead + Send>;

/// Open a dump for line reading, detecting gzip by its magic bytes
pub fn open_source(path: &Path) -> Result<SourceReader> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| Error::source(&display, e.to_string()))?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);

    let is_gzip = reader
        .fill_buf()
        .map_err(|e| Error::source(&display, e.to_string()))?
        .starts_with(&GZIP_MAGIC);

    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER_BYTES,
            MultiGzDecoder::new(reader),
        )))
    } else {
        Ok(Box::new(reader))
    }
}

/// Open a dump, retrying transient failures
///
/// Exhausted retries are reported as [`Error::SourceUnavailable`].
pub async fn open_source_with_retry(path: &Path, policy: &RetryPolicy) -> Result<SourceReader> {
    let operation = format!("Opening {}", path.display());
    with_retry(policy, &operation, |_| async { open_source(path) })
        .await
        .map_err(|e| match e {
            Error::RetriesExhausted {
                attempts,
                last_error,
                ..
            } => Error::source(
                path.display().to_string(),
                format!("{last_error} (after {attempts} attempts)"),
            ),
            other => other,
        })
}

/// Iterator over the lines of a source, decoded lossily as UTF-8
///
/// Line terminators are stripped. A read error ends the useful output; it is
/// reported with the number of the line being read.
pub struct SourceLines<R> {
    reader: R,
    path: String,
    line: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> SourceLines<R> {
    /// Wrap a reader; `path` is used in error messages
    pub fn new(reader: R, path: impl Into<String>) -> Self {
        Self {
            reader,
            path: path.into(),
            line: 0,
            buf: Vec::with_capacity(4096),
        }
    }
}

impl<R: BufRead> Iterator for SourceLines<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line += 1;
                let text = String::from_utf8_lossy(&self.buf);
                Some(Ok(text.trim_end_matches(['\n', '\r']).to_string()))
            }
            Err(e) => Some(Err(Error::SourceRead {
                path: self.path.clone(),
                line: self.line + 1,
                message: e.to_string(),
            })),
        }
    }
}

/// Read `reader` on the blocking pool, sending blocks of lines
///
/// The reader stops after the first error (which is sent) or when the
/// receiver is dropped.
pub fn spawn_line_reader(
    reader: SourceReader,
    path: String,
) -> (mpsc::Receiver<Result<Vec<String>>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(BLOCK_CHANNEL_DEPTH);

    let handle = tokio::task::spawn_blocking(move || {
        let mut block = Vec::with_capacity(LINES_PER_BLOCK);

        for line in SourceLines::new(reader, path) {
            match line {
                Ok(line) => {
                    block.push(line);
                    if block.len() == LINES_PER_BLOCK {
                        let full = std::mem::replace(&mut block, Vec::with_capacity(LINES_PER_BLOCK));
                        if tx.blocking_send(Ok(full)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    if !block.is_empty() && tx.blocking_send(Ok(std::mem::take(&mut block))).is_err() {
                        return;
                    }
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            }
        }

        if !block.is_empty() {
            let _ = tx.blocking_send(Ok(block));
        }
    });

    (rx, handle)
}
