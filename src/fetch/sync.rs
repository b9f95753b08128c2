//! Raw dump sync flow

use super::client::DumpFetcher;
use crate::config::Settings;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::remote::RemoteStore;
use crate::retry::with_retry;
use tracing::{info, warn};

/// Flags of a fetch run
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Only handle this dump file
    pub only: Option<String>,
    /// Keep the local copy after upload
    pub keep: bool,
    /// Narrate without any network call
    pub dry_run: bool,
}

/// What happened to one dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAction {
    /// Upstream version matches the manifest
    UpToDate,
    /// Downloaded and uploaded
    Synced {
        /// Bytes uploaded
        bytes: u64,
        /// Objects written
        remote_paths: Vec<String>,
    },
    /// Dry run: would have been checked and synced
    WouldSync,
    /// Not one of the configured dumps
    Unknown,
}

/// Result for one dump file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Dump file name
    pub file: String,
    /// Action taken
    pub action: FetchAction,
}

/// Bring the remote raw copies of the configured dumps up to date
///
/// `manifest` is updated in memory: `source_last_modified`, `source_bytes`
/// and `last_synced` for every synced dump, leaving `converted_chunks` alone.
/// Persisting it is left to the caller.
pub async fn sync_dumps(
    settings: &Settings,
    fetcher: &DumpFetcher,
    remote: &dyn RemoteStore,
    manifest: &mut Manifest,
    options: &FetchOptions,
) -> Result<Vec<FetchOutcome>> {
    let targets: Vec<String> = match &options.only {
        Some(only) => vec![only.clone()],
        None => settings.dumps.clone(),
    };

    let mut outcomes = Vec::with_capacity(targets.len());
    for file in targets {
        let action = if settings.dumps.contains(&file) {
            sync_one(settings, fetcher, remote, manifest, options, &file).await?
        } else {
            warn!("Unknown dump file: {file}");
            FetchAction::Unknown
        };
        outcomes.push(FetchOutcome { file, action });
    }

    Ok(outcomes)
}

async fn sync_one(
    settings: &Settings,
    fetcher: &DumpFetcher,
    remote: &dyn RemoteStore,
    manifest: &mut Manifest,
    options: &FetchOptions,
    file: &str,
) -> Result<FetchAction> {
    let url = settings.dump_url(file)?;
    let target = format!("{}/{file}", settings.raw_prefix.trim_end_matches('/'));

    if options.dry_run {
        info!("[dry-run] Would check {url}, download if changed and upload to {target}");
        return Ok(FetchAction::WouldSync);
    }

    info!("Checking {file}");
    let upstream = fetcher.last_modified(&url).await?;
    let recorded = manifest
        .source(file)
        .and_then(|entry| entry.source_last_modified.as_deref());

    if upstream.is_some() && recorded == upstream.as_deref() {
        info!("{file} already current (upstream {})", upstream.as_deref().unwrap_or_default());
        return Ok(FetchAction::UpToDate);
    }

    tokio::fs::create_dir_all(&settings.download_dir).await?;
    // a local copy may predate `upstream`; always take the current body
    let local = settings.download_dir.join(file);
    fetcher.download(&url, &local).await?;

    let receipt = with_retry(&settings.retry, &format!("Upload of {target}"), |_| {
        remote.upload(&local, &target)
    })
    .await?;
    info!("Uploaded {file} to {target} ({} bytes)", receipt.bytes);

    let entry = manifest.source_mut(file);
    entry.source_last_modified = upstream;
    entry.source_bytes = Some(receipt.bytes);
    entry.touch();

    if !options.keep {
        tokio::fs::remove_file(&local).await?;
    }

    Ok(FetchAction::Synced {
        bytes: receipt.bytes,
        remote_paths: receipt.remote_paths,
    })
}
