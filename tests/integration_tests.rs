//! Integration tests against a local remote store
//!
//! Tests the full end-to-end flow: gzip dump → Parquet chunks → remote upload
//! → manifest reconciliation

use async_trait::async_trait;
use clap::Parser;
use flate2::write::GzEncoder;
use flate2::Compression;
use ol_dump_sync::chunk::CloseReason;
use ol_dump_sync::cli::{Cli, Runner};
use ol_dump_sync::manifest::{Manifest, ManifestStore};
use ol_dump_sync::output::stitch_parts;
use ol_dump_sync::output::ParquetWriterConfig;
use ol_dump_sync::pipeline::{ConvertConfig, Converter};
use ol_dump_sync::remote::{ObjectStoreRemote, RemoteStore, UploadReceipt};
use ol_dump_sync::retry::RetryPolicy;
use ol_dump_sync::{Error, Result};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

const WORKS: &str = "ol_dump_works_latest.txt.gz";

fn work_line(i: usize) -> String {
    format!(
        "/type/work\t/works/OL{i}W\t2\t2024-05-01T10:00:00\t{{\"key\": \"/works/OL{i}W\", \"title\": \"Work {i}\", \"description\": {{\"type\": \"/type/text\", \"value\": \"About {i}\"}}, \"created\": {{\"type\": \"/type/datetime\", \"value\": \"2008-04-01T03:28:50\"}}, \"subjects\": [\"a\", \"b\"]}}\n"
    )
}

fn write_dump(path: &Path, count: usize) {
    let text: String = (0..count).map(work_line).collect();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(text.as_bytes()).unwrap();
    std::fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn parquet_rows(path: &Path) -> usize {
    let reader = ParquetRecordBatchReaderBuilder::try_new(std::fs::File::open(path).unwrap())
        .unwrap()
        .build()
        .unwrap();
    reader.map(|batch| batch.unwrap().num_rows()).sum()
}

/// Workspace with a dump, a local remote root and an output directory
struct Workspace {
    dir: TempDir,
    source: PathBuf,
    remote_root: PathBuf,
}

impl Workspace {
    fn new(records: usize) -> Self {
        let dir = tempdir().unwrap();
        let source = dir.path().join(WORKS);
        write_dump(&source, records);
        let remote_root = dir.path().join("remote");
        std::fs::create_dir_all(&remote_root).unwrap();
        Self {
            dir,
            source,
            remote_root,
        }
    }

    fn remote(&self) -> Arc<ObjectStoreRemote> {
        Arc::new(ObjectStoreRemote::parse(self.remote_root.to_str().unwrap()).unwrap())
    }

    fn output_prefix(&self) -> PathBuf {
        self.dir.path().join("out").join("works")
    }

    fn config(&self) -> ConvertConfig {
        let mut config = ConvertConfig::new(&self.source, self.output_prefix());
        config.retry = RetryPolicy::new(2).without_delay();
        config.source_retry = RetryPolicy::new(2).without_delay();
        config
    }

    fn remote_file(&self, path: &str) -> PathBuf {
        self.remote_root.join(path)
    }
}

/// Remote whose uploads always fail
struct UnreachableRemote;

#[async_trait]
impl RemoteStore for UnreachableRemote {
    async fn upload(&self, _local: &Path, remote: &str) -> Result<UploadReceipt> {
        Err(Error::transfer(remote, "connection refused"))
    }

    async fn delete(&self, remote: &str) -> Result<()> {
        Err(Error::transfer(remote, "connection refused"))
    }
}

// ============================================================================
// Conversion Tests
// ============================================================================

#[tokio::test]
async fn test_convert_single_chunk() {
    let ws = Workspace::new(250);
    let mut manifest = Manifest::new();

    let report = Converter::new(ws.config(), ws.remote())
        .run(&mut manifest)
        .await
        .unwrap();

    assert_eq!(report.parsed, 250);
    assert_eq!(report.chunk_names(), vec!["works/works.parquet"]);
    assert_eq!(report.chunks[0].reason, CloseReason::EndOfStream);
    assert_eq!(parquet_rows(&ws.remote_file("works/works.parquet")), 250);
    assert!(!ws.output_prefix().with_extension("parquet").exists());

    assert_eq!(manifest.chunk_names(WORKS), vec!["works/works.parquet"]);
    let entry = manifest.source(WORKS).unwrap();
    assert!(entry.converted_chunks.values().all(|c| c.converted));
}

#[tokio::test]
async fn test_size_cap_splits_and_stale_parts_are_deleted() {
    let ws = Workspace::new(200);
    let remote = ws.remote();

    // A previous run produced three parts
    let mut manifest = Manifest::new();
    for name in ["works.parquet", "works.part1.parquet", "works.part2.parquet"] {
        let path = ws.remote_file(&format!("works/{name}"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();
        manifest.source_mut(WORKS).record_chunk(&format!("works/{name}"));
    }

    let mut config = ws.config();
    config.batch_rows = 100;
    config.max_chunk_bytes = 1;
    let report = Converter::new(config, remote).run(&mut manifest).await.unwrap();

    assert_eq!(
        report.chunk_names(),
        vec!["works/works.parquet", "works/works.part1.parquet"]
    );
    assert!(report.chunks.iter().all(|c| c.reason == CloseReason::SizeCap));
    assert_eq!(report.reconcile.orphaned, vec!["works/works.part2.parquet"]);
    assert_eq!(report.reconcile.deleted, vec!["works/works.part2.parquet"]);

    assert!(!ws.remote_file("works/works.part2.parquet").exists());
    assert_eq!(parquet_rows(&ws.remote_file("works/works.parquet")), 100);
    assert_eq!(parquet_rows(&ws.remote_file("works/works.part1.parquet")), 100);
    assert_eq!(manifest.chunk_names(WORKS), report.chunk_names());
}

#[tokio::test]
async fn test_rerun_is_skipped_and_force_reconverts() {
    let ws = Workspace::new(30);
    let remote = ws.remote();
    let mut manifest = Manifest::new();

    Converter::new(ws.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();
    let first = manifest.clone();

    let report = Converter::new(ws.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();
    assert!(report.skipped);
    assert!(report.chunks.is_empty());
    assert_eq!(manifest, first);

    let mut forced = ws.config();
    forced.force = true;
    let report = Converter::new(forced, remote).run(&mut manifest).await.unwrap();
    assert!(!report.skipped);
    assert_eq!(report.chunk_names(), vec!["works/works.parquet"]);
    assert!(report.reconcile.orphaned.is_empty());
}

#[tokio::test]
async fn test_upload_failure_keeps_local_part_and_manifest() {
    let ws = Workspace::new(20);
    let mut manifest = Manifest::new();
    manifest.source_mut(WORKS).record_chunk("works/works.part4.parquet");
    let before = manifest.clone();

    let err = Converter::new(ws.config(), Arc::new(UnreachableRemote))
        .run(&mut manifest)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RetriesExhausted { attempts: 2, .. }));
    assert!(ws.output_prefix().with_extension("parquet").exists());
    assert_eq!(manifest, before);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let ws = Workspace::new(40);
    let mut manifest = Manifest::new();

    let mut config = ws.config();
    config.dry_run = true;
    let report = Converter::new(config, ws.remote()).run(&mut manifest).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.parsed, 40);
    assert!(manifest.is_empty());
    assert!(!ws.remote_file("works").exists());
    assert!(!ws.dir.path().join("out").exists());
}

// ============================================================================
// Manifest and Stitch Tests
// ============================================================================

#[tokio::test]
async fn test_manifest_save_and_mirror() {
    let ws = Workspace::new(10);
    let remote = ws.remote();
    let store = ManifestStore::new(ws.dir.path().join("state").join("ol_sync_manifest.json"));
    let mut manifest = store.load().await.unwrap();
    assert!(manifest.is_empty());

    Converter::new(ws.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();
    store.save(&manifest).await.unwrap();
    let target = store
        .mirror(remote.as_ref(), "metadata", &RetryPolicy::new(1))
        .await
        .unwrap();

    assert_eq!(target, "metadata/ol_sync_manifest.json");
    assert_eq!(store.load().await.unwrap(), manifest);

    let mirrored: Manifest =
        serde_json::from_slice(&std::fs::read(ws.remote_file(&target)).unwrap()).unwrap();
    assert_eq!(mirrored, manifest);
}

#[tokio::test]
async fn test_stitch_uploaded_parts() {
    let ws = Workspace::new(300);
    let mut config = ws.config();
    config.batch_rows = 100;
    config.max_chunk_bytes = 1;
    Converter::new(config, ws.remote())
        .run(&mut Manifest::new())
        .await
        .unwrap();

    let out = ws.dir.path().join("stitched");
    let report = stitch_parts(
        ws.remote_file("works"),
        "works",
        &out,
        &ParquetWriterConfig::default(),
    )
    .unwrap();

    assert_eq!(report.parts.len(), 3);
    assert_eq!(report.rows, 300);
    assert_eq!(parquet_rows(&out.join("works.full.parquet")), 300);
}

// ============================================================================
// CLI Tests
// ============================================================================

#[tokio::test]
async fn test_cli_convert_saves_and_mirrors_manifest() {
    let ws = Workspace::new(25);
    let manifest_path = ws.dir.path().join("ol_sync_manifest.json");

    let cli = Cli::parse_from([
        "ol-dump-sync",
        "--remote",
        ws.remote_root.to_str().unwrap(),
        "--manifest",
        manifest_path.to_str().unwrap(),
        "--format",
        "json",
        "convert",
        ws.source.to_str().unwrap(),
        ws.output_prefix().to_str().unwrap(),
    ]);
    Runner::new(cli).run().await.unwrap();

    let manifest = ManifestStore::new(&manifest_path).load().await.unwrap();
    assert_eq!(manifest.chunk_names(WORKS), vec!["works/works.parquet"]);
    assert!(ws.remote_file("works/works.parquet").exists());
    assert!(ws.remote_file("metadata/ol_sync_manifest.json").exists());
}

#[tokio::test]
async fn test_cli_convert_requires_remote() {
    let ws = Workspace::new(5);

    let cli = Cli::parse_from([
        "ol-dump-sync",
        "--manifest",
        ws.dir.path().join("m.json").to_str().unwrap(),
        "convert",
        ws.source.to_str().unwrap(),
        ws.output_prefix().to_str().unwrap(),
    ]);
    let err = Runner::new(cli).run().await.unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[tokio::test]
async fn test_cli_clean_deletes_recorded_chunks() {
    let ws = Workspace::new(200);
    let manifest_path = ws.dir.path().join("ol_sync_manifest.json");
    let store = ManifestStore::new(&manifest_path);

    let mut manifest = Manifest::new();
    let mut config = ws.config();
    config.batch_rows = 100;
    config.max_chunk_bytes = 1;
    let report = Converter::new(config.clone(), ws.remote())
        .run(&mut manifest)
        .await
        .unwrap();
    assert_eq!(report.chunks.len(), 2);
    store.save(&manifest).await.unwrap();

    let cli = Cli::parse_from([
        "ol-dump-sync",
        "--remote",
        ws.remote_root.to_str().unwrap(),
        "--manifest",
        manifest_path.to_str().unwrap(),
        "clean",
        WORKS,
    ]);
    Runner::new(cli).run().await.unwrap();

    assert!(!ws.remote_file("works/works.parquet").exists());
    assert!(!ws.remote_file("works/works.part1.parquet").exists());

    let manifest = store.load().await.unwrap();
    let entry = manifest.source(WORKS).unwrap();
    assert!(entry.converted_chunks.is_empty());
    assert!(entry.conversion.is_none());

    let mirrored: Manifest = serde_json::from_str(
        &std::fs::read_to_string(ws.remote_file("metadata/ol_sync_manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(mirrored, manifest);

    // the next conversion runs again instead of being skipped
    let mut manifest = manifest;
    let report = Converter::new(config, ws.remote()).run(&mut manifest).await.unwrap();
    assert!(!report.skipped);
    assert!(ws.remote_file("works/works.parquet").exists());
}

#[tokio::test]
async fn test_cli_clean_dry_run_keeps_everything() {
    let ws = Workspace::new(20);
    let manifest_path = ws.dir.path().join("ol_sync_manifest.json");
    let store = ManifestStore::new(&manifest_path);

    let mut manifest = Manifest::new();
    Converter::new(ws.config(), ws.remote())
        .run(&mut manifest)
        .await
        .unwrap();
    store.save(&manifest).await.unwrap();

    let cli = Cli::parse_from([
        "ol-dump-sync",
        "--manifest",
        manifest_path.to_str().unwrap(),
        "clean",
        WORKS,
        "--dry-run",
    ]);
    Runner::new(cli).run().await.unwrap();

    assert!(ws.remote_file("works/works.parquet").exists());
    assert_eq!(store.load().await.unwrap(), manifest);
}
