//! `object_store` backed remote (S3, R2, GCS, Azure, local directory)

use super::{split_part_path, RemoteStore, UploadReceipt, DEFAULT_SPLIT_BYTES, MULTIPART_THRESHOLD};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Size of each buffer handed to a multipart upload
const PART_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// Concurrent part uploads per multipart upload
const MULTIPART_CONCURRENCY: usize = 4;

/// Remote store on top of any `object_store` backend
#[derive(Debug, Clone)]
pub struct ObjectStoreRemote {
    store: Arc<dyn ObjectStore>,
    /// Path prefix within the bucket/container
    prefix: String,
    /// URL scheme, for logging
    scheme: String,
    split_bytes: u64,
    multipart_threshold: u64,
}

impl ObjectStoreRemote {
    /// Parse a remote URL and create the matching object store
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` - AWS S3
    /// - `r2://bucket/path/` - Cloudflare R2 (S3-compatible)
    /// - `gs://bucket/path/` - Google Cloud Storage
    /// - `az://container/path/` - Azure Blob Storage
    /// - `/local/path/`, `./path/` or `file:///path/` - Local filesystem
    ///
    /// Credentials come from the usual provider environment variables.
    pub fn parse(url: &str) -> Result<Self> {
        if let Some(rest) = url.strip_prefix("s3://") {
            Self::parse_s3(rest, "s3")
        } else if let Some(rest) = url.strip_prefix("r2://") {
            Self::parse_s3(rest, "r2")
        } else if let Some(rest) = url.strip_prefix("gs://") {
            Self::parse_gcs(rest)
        } else if let Some(rest) = url.strip_prefix("az://") {
            Self::parse_azure(rest)
        } else {
            Self::parse_local(url.strip_prefix("file://").unwrap_or(url))
        }
    }

    /// Wrap an existing store, rooted at `prefix`
    pub fn from_store(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self::new(store, prefix.into(), "memory")
    }

    fn new(store: Arc<dyn ObjectStore>, prefix: String, scheme: &str) -> Self {
        Self {
            store,
            prefix: prefix.trim_matches('/').to_string(),
            scheme: scheme.to_string(),
            split_bytes: DEFAULT_SPLIT_BYTES,
            multipart_threshold: MULTIPART_THRESHOLD,
        }
    }

    /// Store artifacts above `bytes` as byte parts
    #[must_use]
    pub fn with_split_bytes(mut self, bytes: u64) -> Self {
        self.split_bytes = bytes.max(1);
        self
    }

    /// Use multipart uploads above `bytes`
    #[must_use]
    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold = bytes;
        self
    }

    fn split_bucket(rest: &str) -> (&str, String) {
        match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.to_string()),
            None => (rest, String::new()),
        }
    }

    /// Parse S3 or R2 URL
    fn parse_s3(rest: &str, scheme: &str) -> Result<Self> {
        let (bucket, prefix) = Self::split_bucket(rest);
        if bucket.is_empty() {
            return Err(Error::config(format!("Missing bucket in {scheme}:// URL")));
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        // R2: https://<account_id>.r2.cloudflarestorage.com
        if scheme == "r2" {
            if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                builder = builder.with_endpoint(endpoint);
            }
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create {scheme} client: {e}")))?;

        Ok(Self::new(Arc::new(store), prefix, scheme))
    }

    /// Parse GCS URL
    fn parse_gcs(rest: &str) -> Result<Self> {
        let (bucket, prefix) = Self::split_bucket(rest);
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;

        Ok(Self::new(Arc::new(store), prefix, "gs"))
    }

    /// Parse Azure Blob URL
    fn parse_azure(rest: &str) -> Result<Self> {
        let (container, prefix) = Self::split_bucket(rest);
        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(container)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;

        Ok(Self::new(Arc::new(store), prefix, "az"))
    }

    /// Parse local filesystem path
    fn parse_local(path: &str) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self::new(Arc::new(store), String::new(), "file"))
    }

    /// Get the scheme (s3, r2, gs, az, file)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    fn object_path(&self, remote: &str) -> ObjectPath {
        let remote = remote.trim_start_matches('/');
        if self.prefix.is_empty() {
            ObjectPath::from(remote)
        } else {
            ObjectPath::from(format!("{}/{remote}", self.prefix))
        }
    }

    /// Upload `len` bytes from `reader` as one object
    async fn put_object<R>(&self, reader: &mut R, len: u64, remote: &str) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.object_path(remote);

        if len <= self.multipart_threshold {
            let mut buf = Vec::with_capacity(len as usize);
            reader.read_to_end(&mut buf).await?;
            self.store
                .put(&path, PutPayload::from(Bytes::from(buf)))
                .await?;
            return Ok(());
        }

        debug!("Multipart upload of {len} bytes to {path}");
        let upload = self.store.put_multipart(&path).await?;
        let mut writer = WriteMultipart::new(upload);
        let mut buf = vec![0u8; PART_BUFFER_BYTES];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.wait_for_capacity(MULTIPART_CONCURRENCY).await {
                let _ = writer.abort().await;
                return Err(e.into());
            }
            writer.write(&buf[..n]);
        }

        writer.finish().await?;
        Ok(())
    }

    /// True if the object exists
    async fn exists(&self, remote: &str) -> Result<bool> {
        match self.store.head(&self.object_path(remote)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, remote: &str) -> Result<()> {
        match self.store.delete(&self.object_path(remote)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreRemote {
    async fn upload(&self, local: &Path, remote: &str) -> Result<UploadReceipt> {
        let size = match tokio::fs::metadata(local).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound {
                    path: local.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let mut file = tokio::fs::File::open(local).await?;

        if size <= self.split_bytes {
            self.put_object(&mut file, size, remote).await?;
            debug!("Uploaded {} to {}://{remote}", local.display(), self.scheme);
            return Ok(UploadReceipt {
                remote_paths: vec![remote.to_string()],
                bytes: size,
            });
        }

        let mut remote_paths = Vec::new();
        let mut remaining = size;
        while remaining > 0 {
            let part_len = remaining.min(self.split_bytes);
            let part = split_part_path(remote, remote_paths.len());
            let mut reader = (&mut file).take(part_len);
            self.put_object(&mut reader, part_len, &part).await?;
            remote_paths.push(part);
            remaining -= part_len;
        }

        info!(
            "Uploaded {} to {}://{remote} as {} byte parts",
            local.display(),
            self.scheme,
            remote_paths.len()
        );
        Ok(UploadReceipt {
            remote_paths,
            bytes: size,
        })
    }

    async fn delete(&self, remote: &str) -> Result<()> {
        self.delete_object(remote).await?;

        let mut index = 1;
        loop {
            let part = split_part_path(remote, index);
            if !self.exists(&part).await? {
                break;
            }
            self.delete_object(&part).await?;
            index += 1;
        }

        debug!("Deleted {}://{remote}", self.scheme);
        Ok(())
    }
}
