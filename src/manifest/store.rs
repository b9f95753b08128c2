//! Manifest persistence
//!
//! File-based, with atomic writes (temp file, then rename) and an optional
//! mirror of the saved file on the remote store.

use super::types::Manifest;
use crate::error::{Error, Result};
use crate::remote::RemoteStore;
use crate::retry::{with_retry, RetryPolicy};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default manifest location
pub const DEFAULT_MANIFEST_PATH: &str = "ol_sync_manifest.json";

/// Loads and saves the manifest file
#[derive(Debug, Clone)]
pub struct ManifestStore {
    /// Path to the manifest file
    path: PathBuf,
}

impl ManifestStore {
    /// Create a store for the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path to the manifest file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used for the remote mirror
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_MANIFEST_PATH.to_string())
    }

    /// Load the manifest; a missing file is an empty manifest
    pub async fn load(&self) -> Result<Manifest> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!("No manifest at {}, starting empty", self.path.display());
            return Ok(Manifest::new());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::manifest(format!("Failed to read manifest file: {e}")))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::manifest(format!("Failed to parse manifest file: {e}")))
    }

    /// Save the manifest as pretty-printed JSON
    pub async fn save(&self, manifest: &Manifest) -> Result<()> {
        let contents = serde_json::to_string_pretty(manifest)
            .map_err(|e| Error::manifest(format!("Failed to serialize manifest: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::manifest(format!("Failed to write manifest file: {e}")))?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::manifest(format!("Failed to rename manifest file: {e}")))?;

        info!("Manifest saved to {}", self.path.display());
        Ok(())
    }

    /// Upload the saved file to `{metadata_prefix}/{file_name}`
    pub async fn mirror(
        &self,
        remote: &dyn RemoteStore,
        metadata_prefix: &str,
        retry: &RetryPolicy,
    ) -> Result<String> {
        let target = format!("{}/{}", metadata_prefix.trim_end_matches('/'), self.file_name());
        with_retry(retry, &format!("Upload of {target}"), |_| {
            remote.upload(&self.path, &target)
        })
        .await?;

        info!("Manifest mirrored to {target}");
        Ok(target)
    }
}
