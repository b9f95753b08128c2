//! Remote dataset store
//!
//! Everything the converter and fetcher push to, or remove from, the remote
//! goes through the [`RemoteStore`] trait. [`ObjectStoreRemote`] implements it
//! over `object_store` for S3, R2, GCS, Azure and local directories.
//!
//! # Large artifacts
//!
//! Files above [`MULTIPART_THRESHOLD`] are streamed with a multipart upload.
//! Files above the configured split size (default [`DEFAULT_SPLIT_BYTES`]) are
//! stored as consecutive byte parts: the first under `{remote}` itself, then
//! `{remote}.part1`, `{remote}.part2`, …

mod object;

pub use object::ObjectStoreRemote;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Single-request upload limit; larger files use multipart
pub const MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Default size above which an artifact is split into byte parts (5 GiB)
pub const DEFAULT_SPLIT_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Objects written, in byte order
    pub remote_paths: Vec<String>,
    /// Total bytes transferred
    pub bytes: u64,
}

impl UploadReceipt {
    /// True if the artifact was stored as byte parts
    pub fn is_split(&self) -> bool {
        self.remote_paths.len() > 1
    }
}

/// A place chunks, raw dumps and the manifest are published to
///
/// Paths are relative to the store's root (`authors/authors.parquet`,
/// `metadata/ol_sync_manifest.json`).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload a local file to `remote`
    async fn upload(&self, local: &Path, remote: &str) -> Result<UploadReceipt>;

    /// Delete `remote` (and any byte parts of it); a missing object is not an error
    async fn delete(&self, remote: &str) -> Result<()>;
}

/// Name of byte part `index` of `remote`; part 0 is `remote` itself
pub fn split_part_path(remote: &str, index: usize) -> String {
    if index == 0 {
        remote.to_string()
    } else {
        format!("{remote}.part{index}")
    }
}
