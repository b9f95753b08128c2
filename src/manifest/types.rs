//! Manifest types
//!
//! These types are serialized to JSON and persisted between runs.

use crate::types::{utc_now, JsonValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whole manifest, keyed by source file name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    sources: BTreeMap<String, SourceEntry>,
}

impl Manifest {
    /// Create a new empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for a source file
    pub fn source(&self, name: &str) -> Option<&SourceEntry> {
        self.sources.get(name)
    }

    /// Get mutable entry for a source file, creating if needed
    pub fn source_mut(&mut self, name: &str) -> &mut SourceEntry {
        self.sources.entry(name.to_string()).or_default()
    }

    /// Chunk names recorded for a source file, in name order
    pub fn chunk_names(&self, name: &str) -> Vec<String> {
        self.sources
            .get(name)
            .map(|entry| entry.converted_chunks.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Source file names, in name order
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Number of source files tracked
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Per-source-file record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Upstream `Last-Modified` value the local copy corresponds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_last_modified: Option<String>,

    /// Size of the raw file `fetch` synced for that version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_bytes: Option<u64>,

    /// When the source file itself was last synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<String>,

    /// Chunks currently present on the remote, by remote path
    #[serde(default)]
    pub converted_chunks: BTreeMap<String, ChunkEntry>,

    /// Parameters of the last completed conversion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion: Option<ConversionStamp>,

    /// Keys written by other tools, kept as-is
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl SourceEntry {
    /// Record a chunk as converted and present remotely
    pub fn record_chunk(&mut self, name: &str) {
        self.converted_chunks
            .insert(name.to_string(), ChunkEntry::converted_now());
    }

    /// Forget a chunk; returns true if it was recorded
    pub fn remove_chunk(&mut self, name: &str) -> bool {
        self.converted_chunks.remove(name).is_some()
    }

    /// Refresh `last_synced`
    pub fn touch(&mut self) {
        self.last_synced = Some(utc_now());
    }
}

/// State of one converted chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// The chunk was converted and uploaded
    #[serde(default)]
    pub converted: bool,

    /// When it was last uploaded
    #[serde(default)]
    pub last_synced: String,
}

impl ChunkEntry {
    /// A converted entry stamped with the current time
    pub fn converted_now() -> Self {
        Self {
            converted: true,
            last_synced: utc_now(),
        }
    }
}

/// What a completed conversion was run against
///
/// A rerun whose stamp matches this one would reproduce the same chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStamp {
    /// Source version that was converted: the upstream `Last-Modified` of
    /// a fetched file, else `local:{mtime}:{bytes}`
    pub source_last_modified: String,
    /// Batch row threshold used
    pub batch_rows: usize,
    /// Approximate batch byte threshold used, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_max_bytes: Option<usize>,
    /// Chunk size cap used, in bytes
    pub max_chunk_bytes: u64,
}
