//! Settings for conversion and sync runs
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `OL_*` environment variables. CLI flags are applied last by the runner.
//!
//! ```yaml
//! remote_url: s3://my-bucket/openlibrary
//! manifest_path: ol_sync_manifest.json
//! batch_rows: 100000
//! max_chunk_bytes: 3221225472
//! retry:
//!   max_attempts: 3
//!   initial_backoff_ms: 2000
//! dumps:
//!   - ol_dump_authors_latest.txt.gz
//! ```

use crate::batch::DEFAULT_BATCH_ROWS;
use crate::chunk::DEFAULT_MAX_CHUNK_BYTES;
use crate::error::{Error, Result};
use crate::manifest::DEFAULT_MANIFEST_PATH;
use crate::normalize::DEFAULT_RICH_TEXT_FIELDS;
use crate::remote::DEFAULT_SPLIT_BYTES;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "OL_";

// ============================================================================
// Settings
// ============================================================================

/// Complete settings for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Remote store URL (`s3://`, `r2://`, `gs://`, `az://` or a local path)
    pub remote_url: Option<String>,

    /// Local manifest file
    pub manifest_path: PathBuf,

    /// Rows per batch (and per row group)
    pub batch_rows: usize,

    /// Also cut a batch once its source text reaches this many bytes
    pub batch_max_bytes: Option<usize>,

    /// Close a chunk once it reaches this many bytes on disk
    pub max_chunk_bytes: u64,

    /// Store remote artifacts above this size as byte parts
    pub transfer_split_bytes: u64,

    /// Fields holding OpenLibrary text blocks
    pub rich_text_fields: Vec<String>,

    /// Retry policy for uploads, deletions and HTTP requests
    pub retry: RetryPolicy,

    /// Retry policy for opening the source dump
    pub source_retry: RetryPolicy,

    /// Log progress every this many lines
    pub progress_interval: u64,

    /// Malformed lines kept for the summary
    pub malformed_sample_size: usize,

    /// Where the dumps are published
    pub dump_base_url: String,

    /// Dump files handled by `fetch`
    pub dumps: Vec<String>,

    /// Local directory dumps are downloaded to
    pub download_dir: PathBuf,

    /// Remote directory for raw dumps
    pub raw_prefix: String,

    /// Remote directory for the manifest mirror
    pub metadata_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_url: None,
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            batch_rows: DEFAULT_BATCH_ROWS,
            batch_max_bytes: None,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            transfer_split_bytes: DEFAULT_SPLIT_BYTES,
            rich_text_fields: DEFAULT_RICH_TEXT_FIELDS
                .iter()
                .map(ToString::to_string)
                .collect(),
            retry: RetryPolicy::default(),
            source_retry: RetryPolicy::default(),
            progress_interval: 1_000_000,
            malformed_sample_size: 5,
            dump_base_url: "https://openlibrary.org/data/".to_string(),
            dumps: default_dumps(),
            download_dir: PathBuf::from("."),
            raw_prefix: "raw".to_string(),
            metadata_prefix: "metadata".to_string(),
        }
    }
}

fn default_dumps() -> Vec<String> {
    ["authors", "editions", "works"]
        .iter()
        .map(|name| format!("ol_dump_{name}_latest.txt.gz"))
        .collect()
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read settings file '{}': {e}",
                    path.display()
                ))
            }
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load settings from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse settings YAML: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `OL_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `OL_*` overrides from any variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(v) = var("REMOTE_URL") {
            self.remote_url = Some(v);
        }
        if let Some(v) = var("MANIFEST_PATH") {
            self.manifest_path = PathBuf::from(v);
        }
        if let Some(v) = var("BATCH_ROWS") {
            self.batch_rows = parse_number("OL_BATCH_ROWS", &v)?;
        }
        if let Some(v) = var("BATCH_MAX_BYTES") {
            self.batch_max_bytes = Some(parse_number("OL_BATCH_MAX_BYTES", &v)?);
        }
        if let Some(v) = var("MAX_CHUNK_BYTES") {
            self.max_chunk_bytes = parse_number("OL_MAX_CHUNK_BYTES", &v)?;
        }
        if let Some(v) = var("TRANSFER_SPLIT_BYTES") {
            self.transfer_split_bytes = parse_number("OL_TRANSFER_SPLIT_BYTES", &v)?;
        }
        if let Some(v) = var("RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse_number("OL_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("RETRY_BACKOFF_MS") {
            self.retry.initial_backoff_ms = parse_number("OL_RETRY_BACKOFF_MS", &v)?;
        }
        if let Some(v) = var("PROGRESS_INTERVAL") {
            self.progress_interval = parse_number("OL_PROGRESS_INTERVAL", &v)?;
        }
        if let Some(v) = var("RICH_TEXT_FIELDS") {
            self.rich_text_fields = v
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(v) = var("DUMP_BASE_URL") {
            self.dump_base_url = v;
        }
        if let Some(v) = var("DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(v);
        }

        self.validate()
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.batch_rows == 0 {
            return Err(Error::invalid_value("batch_rows", "must be at least 1"));
        }
        if self.max_chunk_bytes == 0 {
            return Err(Error::invalid_value("max_chunk_bytes", "must be at least 1"));
        }
        if self.transfer_split_bytes == 0 {
            return Err(Error::invalid_value(
                "transfer_split_bytes",
                "must be at least 1",
            ));
        }
        if self.progress_interval == 0 {
            return Err(Error::invalid_value("progress_interval", "must be at least 1"));
        }
        if self.dump_base_url.is_empty() {
            return Err(Error::invalid_value("dump_base_url", "cannot be empty"));
        }
        Ok(())
    }

    /// Download URL of a dump file
    pub fn dump_url(&self, file_name: &str) -> Result<Url> {
        let base = if self.dump_base_url.ends_with('/') {
            self.dump_base_url.clone()
        } else {
            format!("{}/", self.dump_base_url)
        };
        Ok(Url::parse(&base)?.join(file_name)?)
    }

    /// Remote URL, or an error naming the missing setting
    pub fn require_remote_url(&self) -> Result<&str> {
        self.remote_url.as_deref().ok_or_else(|| {
            Error::config("No remote configured: pass --remote, set OL_REMOTE_URL or remote_url")
        })
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_value(field, format!("'{value}': {e}")))
}
