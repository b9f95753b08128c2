//! HTTP client for the dump host

use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryPolicy};
use reqwest::header::LAST_MODIFIED;
use reqwest::{Client, Response};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Timeout for metadata requests
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches dump metadata and bodies with bounded retry
#[derive(Debug, Clone)]
pub struct DumpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl DumpFetcher {
    /// Create a fetcher using `retry` for every request
    pub fn new(retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("ol-dump-sync/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, retry })
    }

    /// Upstream `Last-Modified` header of `url`, if the server sends one
    pub async fn last_modified(&self, url: &Url) -> Result<Option<String>> {
        let operation = format!("HEAD {url}");
        let response = with_retry(&self.retry, &operation, |_| async {
            let response = self
                .client
                .head(url.clone())
                .timeout(HEAD_TIMEOUT)
                .send()
                .await?;
            check_status(response).await
        })
        .await?;

        let value = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        debug!("{url} Last-Modified: {value:?}");
        Ok(value)
    }

    /// Stream `url` into `dest`; returns the number of bytes written
    ///
    /// The body goes to a `.partial` sibling first and is renamed into place
    /// once complete, so `dest` never holds a truncated download.
    pub async fn download(&self, url: &Url, dest: &Path) -> Result<u64> {
        let operation = format!("GET {url}");
        let partial = dest.with_extension("partial");

        let bytes = with_retry(&self.retry, &operation, |_| {
            let partial = partial.clone();
            async move {
                let mut response = check_status(self.client.get(url.clone()).send().await?).await?;
                let mut file = tokio::fs::File::create(&partial).await?;
                let mut written = 0u64;

                while let Some(chunk) = response.chunk().await? {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                file.flush().await?;
                Ok(written)
            }
        })
        .await?;

        tokio::fs::rename(&partial, dest).await?;
        info!("Downloaded {url} ({bytes} bytes) to {}", dest.display());
        Ok(bytes)
    }
}

/// Turn a non-success status into [`Error::HttpStatus`]
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::http_status(status.as_u16(), body))
}
