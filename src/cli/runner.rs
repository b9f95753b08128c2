//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::fetch::{sync_dumps, DumpFetcher, FetchAction, FetchOptions, FetchOutcome};
use crate::manifest::{ManifestStore, ReconcileReport, Reconciler};
use crate::output::{stitch_parts, ParquetWriterConfig};
use crate::pipeline::{ConversionReport, ConvertConfig, Converter};
use crate::remote::{ObjectStoreRemote, RemoteStore};
use object_store::memory::InMemory;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Convert {
                input,
                output_prefix,
                dataset,
                dry_run,
                force,
                batch_rows,
                max_chunk_bytes,
            } => {
                let settings = self.settings()?;
                let mut config = ConvertConfig::from_settings(&settings, input, output_prefix);
                config.dataset.clone_from(dataset);
                config.dry_run = *dry_run;
                config.force = *force;
                if let Some(rows) = batch_rows {
                    config.batch_rows = (*rows).max(1);
                }
                if let Some(bytes) = max_chunk_bytes {
                    config.max_chunk_bytes = (*bytes).max(1);
                }
                self.convert(&settings, config).await
            }
            Commands::Fetch {
                only,
                keep,
                dry_run,
            } => {
                let options = FetchOptions {
                    only: only.clone(),
                    keep: *keep,
                    dry_run: *dry_run,
                };
                self.fetch(&self.settings()?, &options).await
            }
            Commands::Clean { source, dry_run } => {
                self.clean(&self.settings()?, source, *dry_run).await
            }
            Commands::Stitch {
                dir,
                base,
                output_dir,
            } => self.stitch(dir, base, output_dir.as_deref()).await,
        }
    }

    /// Defaults, then the settings file, then `OL_*`, then global flags
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.cli.settings {
            Some(path) => Settings::from_yaml_file(path)?,
            None => Settings::default(),
        };
        settings.apply_env()?;

        if let Some(remote) = &self.cli.remote {
            settings.remote_url = Some(remote.clone());
        }
        if let Some(manifest) = &self.cli.manifest {
            settings.manifest_path.clone_from(manifest);
        }
        Ok(settings)
    }

    /// Remote for a run; dry runs never touch the configured one
    fn remote(&self, settings: &Settings, dry_run: bool) -> Result<Arc<ObjectStoreRemote>> {
        let remote = if dry_run {
            ObjectStoreRemote::from_store(Arc::new(InMemory::new()), "")
        } else {
            ObjectStoreRemote::parse(settings.require_remote_url()?)?
        };
        Ok(Arc::new(remote.with_split_bytes(settings.transfer_split_bytes)))
    }

    async fn convert(&self, settings: &Settings, config: ConvertConfig) -> Result<()> {
        let started = Instant::now();
        let dry_run = config.dry_run;
        let remote = self.remote(settings, dry_run)?;
        let store = ManifestStore::new(&settings.manifest_path);
        let mut manifest = store.load().await?;

        let converter = Converter::new(config, remote.clone());
        let report = converter.run(&mut manifest).await?;
        report.log_summary();

        if !dry_run && !report.skipped {
            store.save(&manifest).await?;
            self.mirror_manifest(&store, remote.as_ref(), settings).await?;
        }

        self.output_message(&conversion_summary(&report, started.elapsed().as_secs_f64()));
        Ok(())
    }

    async fn fetch(&self, settings: &Settings, options: &FetchOptions) -> Result<()> {
        let remote = self.remote(settings, options.dry_run)?;
        let store = ManifestStore::new(&settings.manifest_path);
        let mut manifest = store.load().await?;
        let fetcher = DumpFetcher::new(settings.retry.clone())?;

        let outcomes = sync_dumps(settings, &fetcher, remote.as_ref(), &mut manifest, options).await?;

        let changed = outcomes
            .iter()
            .any(|o| matches!(o.action, FetchAction::Synced { .. }));
        if !options.dry_run && changed {
            store.save(&manifest).await?;
            self.mirror_manifest(&store, remote.as_ref(), settings).await?;
            info!("Raw dump sync complete");
        }

        for outcome in &outcomes {
            self.output_message(&fetch_summary(outcome, options.dry_run));
        }
        Ok(())
    }

    async fn clean(&self, settings: &Settings, source: &str, dry_run: bool) -> Result<()> {
        let source = Path::new(source)
            .file_name()
            .map_or_else(|| source.to_string(), |n| n.to_string_lossy().to_string());
        let remote = self.remote(settings, dry_run)?;
        let store = ManifestStore::new(&settings.manifest_path);
        let mut manifest = store.load().await?;

        let report = Reconciler::new(remote.as_ref(), settings.retry.clone())
            .dry_run(dry_run)
            .clean(&mut manifest, &source)
            .await;

        if !dry_run && !report.deleted.is_empty() {
            store.save(&manifest).await?;
            self.mirror_manifest(&store, remote.as_ref(), settings).await?;
        }
        info!(
            "{source}: {} chunks deleted, {} failed",
            report.deleted.len(),
            report.failed.len()
        );

        self.output_message(&clean_summary(&source, &report, dry_run));
        Ok(())
    }

    async fn stitch(&self, dir: &Path, base: &str, output_dir: Option<&Path>) -> Result<()> {
        let input: PathBuf = dir.to_path_buf();
        let output: PathBuf = output_dir.unwrap_or(dir).to_path_buf();
        let base_name = base.to_string();

        let report = tokio::task::spawn_blocking(move || {
            stitch_parts(&input, &base_name, &output, &ParquetWriterConfig::default())
        })
        .await
        .map_err(|e| Error::Other(format!("Stitch task failed: {e}")))??;

        self.output_message(&json!({
            "type": "STITCH",
            "base": base,
            "parts": report.parts.len(),
            "rows": report.rows,
            "output": report.output.display().to_string(),
        }));
        Ok(())
    }

    async fn mirror_manifest(
        &self,
        store: &ManifestStore,
        remote: &dyn RemoteStore,
        settings: &Settings,
    ) -> Result<()> {
        store
            .mirror(remote, &settings.metadata_prefix, &settings.retry)
            .await?;
        Ok(())
    }

    /// Print a summary message in the selected format
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn conversion_summary(report: &ConversionReport, elapsed_secs: f64) -> Value {
    json!({
        "type": "CONVERSION",
        "source": report.source,
        "dataset": report.dataset,
        "dry_run": report.dry_run,
        "skipped": report.skipped,
        "total_lines": report.total_lines,
        "parsed": report.parsed,
        "malformed": {
            "count": report.malformed.count(),
            "samples": report.malformed.samples(),
        },
        "chunks": report.chunks.iter().map(|c| json!({
            "name": c.remote_path,
            "rows": c.rows,
            "bytes": c.bytes,
            "closed_on": c.reason.to_string(),
        })).collect::<Vec<_>>(),
        "orphans": {
            "found": report.reconcile.orphaned,
            "deleted": report.reconcile.deleted,
            "failed": report.reconcile.failed,
        },
        "elapsed_secs": (elapsed_secs * 10.0).round() / 10.0,
    })
}

fn fetch_summary(outcome: &FetchOutcome, dry_run: bool) -> Value {
    let (action, bytes, remote_paths) = match &outcome.action {
        FetchAction::UpToDate => ("up_to_date", 0, Vec::new()),
        FetchAction::Synced {
            bytes,
            remote_paths,
        } => ("synced", *bytes, remote_paths.clone()),
        FetchAction::WouldSync => ("would_sync", 0, Vec::new()),
        FetchAction::Unknown => ("unknown", 0, Vec::new()),
    };

    json!({
        "type": "FETCH",
        "file": outcome.file,
        "action": action,
        "bytes": bytes,
        "remote_paths": remote_paths,
        "dry_run": dry_run,
    })
}

fn clean_summary(source: &str, report: &ReconcileReport, dry_run: bool) -> Value {
    json!({
        "type": "CLEAN",
        "source": source,
        "deleted": report.deleted,
        "failed": report.failed,
        "dry_run": dry_run,
    })
}
