//! Dump to Parquet conversion driver

use super::source::{open_source_with_retry, spawn_line_reader};
use crate::batch::BatchWriter;
use crate::chunk::{ChunkOutcome, ChunkSink, ChunkSinkConfig};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::manifest::{ConversionStamp, Manifest, ReconcileReport, Reconciler};
use crate::normalize::{dataset_name_for, MalformedLines, RecordNormalizer};
use crate::output::ParquetWriterConfig;
use crate::remote::RemoteStore;
use crate::retry::RetryPolicy;
use crate::types::utc_now;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a single conversion run needs
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Source dump file
    pub source: PathBuf,
    /// Local path prefix of the parts: `out/works` → `out/works.parquet`, …
    pub output_prefix: PathBuf,
    /// Remote directory; derived from the source name when unset
    pub dataset: Option<String>,
    /// Rows per batch
    pub batch_rows: usize,
    /// Optional approximate byte threshold per batch
    pub batch_max_bytes: Option<usize>,
    /// Chunk size cap in bytes
    pub max_chunk_bytes: u64,
    /// Narrate instead of writing, uploading or deleting
    pub dry_run: bool,
    /// Convert even if the manifest says this exact conversion is done
    pub force: bool,
    /// Upload and delete retry policy
    pub retry: RetryPolicy,
    /// Source open retry policy
    pub source_retry: RetryPolicy,
    /// Fields collapsed to their text value
    pub rich_text_fields: Vec<String>,
    /// Log progress every this many lines
    pub progress_interval: u64,
    /// Malformed lines kept for the summary
    pub malformed_sample_size: usize,
    /// Parquet encoding
    pub writer: ParquetWriterConfig,
}

impl ConvertConfig {
    /// Config with default thresholds
    pub fn new(source: impl Into<PathBuf>, output_prefix: impl Into<PathBuf>) -> Self {
        Self::from_settings(&Settings::default(), source, output_prefix)
    }

    /// Config taking thresholds and policies from `settings`
    pub fn from_settings(
        settings: &Settings,
        source: impl Into<PathBuf>,
        output_prefix: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            output_prefix: output_prefix.into(),
            dataset: None,
            batch_rows: settings.batch_rows,
            batch_max_bytes: settings.batch_max_bytes,
            max_chunk_bytes: settings.max_chunk_bytes,
            dry_run: false,
            force: false,
            retry: settings.retry.clone(),
            source_retry: settings.source_retry.clone(),
            rich_text_fields: settings.rich_text_fields.clone(),
            progress_interval: settings.progress_interval,
            malformed_sample_size: settings.malformed_sample_size,
            writer: ParquetWriterConfig::default(),
        }
    }

    /// Manifest key: the source file name
    pub fn source_name(&self) -> String {
        file_name(&self.source)
    }

    /// Remote directory for the parts
    pub fn dataset_name(&self) -> String {
        self.dataset
            .clone()
            .unwrap_or_else(|| dataset_name_for(&self.source))
    }

    /// Base name of the parts
    pub fn stem(&self) -> String {
        file_name(&self.output_prefix)
    }

    /// Local directory the parts are written to
    pub fn work_dir(&self) -> PathBuf {
        match self.output_prefix.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.stem().is_empty() {
            return Err(Error::invalid_value(
                "output_prefix",
                format!("'{}' has no file name", self.output_prefix.display()),
            ));
        }
        if self.dataset_name().is_empty() {
            return Err(Error::invalid_value("dataset", "cannot be empty"));
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// What a conversion run did
#[derive(Debug, Clone, Default)]
pub struct ConversionReport {
    /// Manifest key of the source
    pub source: String,
    /// Remote directory of the parts
    pub dataset: String,
    /// Lines read, blank ones included
    pub total_lines: u64,
    /// Records written
    pub parsed: u64,
    /// Skipped lines
    pub malformed: MalformedLines,
    /// Parts in close order
    pub chunks: Vec<ChunkOutcome>,
    /// Orphan cleanup
    pub reconcile: ReconcileReport,
    /// The manifest already recorded this exact conversion
    pub skipped: bool,
    /// Nothing was written, uploaded or deleted
    pub dry_run: bool,
}

impl ConversionReport {
    /// Remote paths of the produced parts
    pub fn chunk_names(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.remote_path.clone()).collect()
    }

    /// Log the end-of-run summary
    pub fn log_summary(&self) {
        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        if self.skipped {
            info!("{prefix}{} already converted, nothing to do", self.source);
            return;
        }

        info!(
            "{prefix}{}: {} lines, {} parsed, {} malformed, {} chunks",
            self.source,
            self.total_lines,
            self.parsed,
            self.malformed.count(),
            self.chunks.len()
        );
        for sample in self.malformed.samples() {
            warn!("Malformed line: {sample}");
        }
        for chunk in &self.chunks {
            info!("{prefix}chunk {} ({} rows, {} bytes)", chunk.remote_path, chunk.rows, chunk.bytes);
        }
        if !self.reconcile.orphaned.is_empty() {
            info!(
                "{prefix}orphans: {} deleted, {} failed",
                self.reconcile.deleted.len(),
                self.reconcile.failed.len()
            );
        }
    }
}

/// Single-worker conversion of one dump file
pub struct Converter {
    config: ConvertConfig,
    remote: Arc<dyn RemoteStore>,
}

impl Converter {
    /// Create a converter publishing through `remote`
    pub fn new(config: ConvertConfig, remote: Arc<dyn RemoteStore>) -> Self {
        Self { config, remote }
    }

    /// Run configuration
    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    fn stamp(&self, version: &str) -> ConversionStamp {
        ConversionStamp {
            source_last_modified: version.to_string(),
            batch_rows: self.config.batch_rows,
            batch_max_bytes: self.config.batch_max_bytes,
            max_chunk_bytes: self.config.max_chunk_bytes,
        }
    }

    /// Convert the source, publish the parts and reconcile `manifest`
    ///
    /// The manifest is only modified in memory; persisting it is up to the
    /// caller, once this returned `Ok`. On a dry run it is left untouched.
    pub async fn run(&self, manifest: &mut Manifest) -> Result<ConversionReport> {
        let config = &self.config;
        config.validate()?;

        let source = config.source_name();
        let dataset = config.dataset_name();
        let version = source_version(manifest, &source, &config.source);

        let mut report = ConversionReport {
            source: source.clone(),
            dataset: dataset.clone(),
            malformed: MalformedLines::new(config.malformed_sample_size),
            dry_run: config.dry_run,
            ..ConversionReport::default()
        };

        if let Some(version) = &version {
            if !config.force && is_already_converted(manifest, &source, &self.stamp(version)) {
                info!("{source} unchanged since last conversion, skipping (use --force to redo)");
                report.skipped = true;
                return Ok(report);
            }
        }

        let reader = open_source_with_retry(&config.source, &config.source_retry).await?;
        let stamp = self.stamp(&version.unwrap_or_else(utc_now));
        let (mut blocks, reader_task) =
            spawn_line_reader(reader, config.source.display().to_string());

        let normalizer = RecordNormalizer::with_rich_text_fields(config.rich_text_fields.iter().cloned());
        let mut batch = BatchWriter::new(config.batch_rows).with_max_bytes(config.batch_max_bytes);
        let sink_config = ChunkSinkConfig {
            max_chunk_bytes: config.max_chunk_bytes.max(1),
            dry_run: config.dry_run,
            retry: config.retry.clone(),
            writer: config.writer.clone().with_row_group_size(config.batch_rows),
            ..ChunkSinkConfig::new(config.stem(), dataset.as_str(), config.work_dir())
        };
        let mut sink = ChunkSink::new(sink_config, Arc::clone(&self.remote));
        let progress_interval = config.progress_interval.max(1);

        info!("Converting {} into {dataset}/{}*.parquet", config.source.display(), config.stem());

        while let Some(block) = blocks.recv().await {
            for line in block? {
                report.total_lines += 1;

                if !line.trim().is_empty() {
                    match normalizer.normalize_line(&line) {
                        Ok(record) => {
                            batch.push(record, line.len());
                            report.parsed += 1;
                        }
                        Err(e) => {
                            debug!("Skipping line {}: {e}", report.total_lines);
                            report.malformed.record(&line);
                        }
                    }
                }

                if batch.should_flush() {
                    sink.write_batch(&batch.take_batch()).await?;
                }

                if report.total_lines % progress_interval == 0 {
                    info!(
                        lines = report.total_lines,
                        parsed = report.parsed,
                        chunks = sink.closed().len(),
                        "Progress"
                    );
                }
            }
        }
        reader_task
            .await
            .map_err(|e| Error::Other(format!("Source reader task failed: {e}")))?;

        if !batch.is_empty() {
            sink.write_batch(&batch.take_batch()).await?;
        }
        report.chunks = sink.finish().await?;

        let actual = report.chunk_names();
        report.reconcile = Reconciler::new(self.remote.as_ref(), config.retry.clone())
            .dry_run(config.dry_run)
            .reconcile(manifest, &source, &actual)
            .await;

        if !config.dry_run {
            manifest.source_mut(&source).conversion = Some(stamp);
        }

        Ok(report)
    }
}

/// Version of the source file at `path`
///
/// The upstream `Last-Modified` recorded by `fetch` is used only while the
/// file still has the size `fetch` recorded with it. Otherwise the file is
/// identified by its own modification time and length.
fn source_version(manifest: &Manifest, source: &str, path: &Path) -> Option<String> {
    let meta = std::fs::metadata(path).ok()?;
    let bytes = meta.len();

    if let Some(entry) = manifest.source(source) {
        if let (Some(upstream), Some(recorded)) = (&entry.source_last_modified, entry.source_bytes) {
            if recorded == bytes {
                return Some(upstream.clone());
            }
        }
    }

    let modified = meta.modified().ok()?;
    let mtime = DateTime::<Utc>::from(modified).to_rfc3339_opts(SecondsFormat::Nanos, true);
    Some(format!("local:{mtime}:{bytes}"))
}

/// True if the manifest already holds the output of this exact conversion
fn is_already_converted(manifest: &Manifest, source: &str, stamp: &ConversionStamp) -> bool {
    manifest.source(source).is_some_and(|entry| {
        entry.conversion.as_ref() == Some(stamp)
            && !entry.converted_chunks.is_empty()
            && entry.converted_chunks.values().all(|c| c.converted)
    })
}
