//! Tests for pipeline module

use super::*;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::remote::{ObjectStoreRemote, RemoteStore, UploadReceipt};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use object_store::memory::InMemory;
use pretty_assertions::assert_eq;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn gzip(path: &Path, members: &[&str]) {
    let mut out = Vec::new();
    for member in members {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(member.as_bytes()).unwrap();
        out.extend(encoder.finish().unwrap());
    }
    std::fs::write(path, out).unwrap();
}

fn dump_line(i: usize) -> String {
    format!(
        "/type/work\t/works/OL{i}W\t3\t2024-01-01T00:00:00\t{{\"key\": \"/works/OL{i}W\", \"title\": \"Title {i}\", \"revision\": {i}}}\n"
    )
}

/// Remote counting calls on top of an in-memory store
struct CountingRemote {
    inner: ObjectStoreRemote,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
}

impl CountingRemote {
    fn new() -> Self {
        Self {
            inner: ObjectStoreRemote::from_store(Arc::new(InMemory::new()), ""),
            uploads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteStore for CountingRemote {
    async fn upload(&self, local: &Path, remote: &str) -> Result<UploadReceipt> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.inner.upload(local, remote).await
    }

    async fn delete(&self, remote: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(remote).await
    }
}

struct Fixture {
    dir: TempDir,
    source: PathBuf,
}

impl Fixture {
    fn works(lines: &str) -> Self {
        let dir = tempdir().unwrap();
        let source = dir.path().join("ol_dump_works_latest.txt.gz");
        gzip(&source, &[lines]);
        Self { dir, source }
    }

    fn config(&self) -> ConvertConfig {
        let mut config = ConvertConfig::new(&self.source, self.dir.path().join("out").join("works"));
        config.retry = RetryPolicy::new(2).without_delay();
        config.source_retry = RetryPolicy::new(2).without_delay();
        config
    }
}

// ============================================================================
// Source Tests
// ============================================================================

#[test]
fn test_source_lines_lossy_and_trimmed() {
    let data: &[u8] = b"first\r\nsec\xffond\nlast";
    let lines: Vec<String> = SourceLines::new(Cursor::new(data), "mem")
        .map(Result::unwrap)
        .collect();
    assert_eq!(lines, vec!["first", "sec\u{fffd}ond", "last"]);
}

#[test]
fn test_open_multi_member_gzip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("multi.txt.gz");
    gzip(&path, &["a\nb\n", "c\n"]);

    let lines: Vec<String> = SourceLines::new(open_source(&path).unwrap(), "multi")
        .map(Result::unwrap)
        .collect();
    assert_eq!(lines, vec!["a", "b", "c"]);
}

#[test]
fn test_open_plain_text() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, "x\ny\n").unwrap();

    let lines: Vec<String> = SourceLines::new(open_source(&path).unwrap(), "plain")
        .map(Result::unwrap)
        .collect();
    assert_eq!(lines, vec!["x", "y"]);
}

#[test]
fn test_corrupt_gzip_is_a_read_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.txt.gz");
    std::fs::write(&path, [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad]).unwrap();

    let first = SourceLines::new(open_source(&path).unwrap(), "bad").next().unwrap();
    assert!(matches!(first, Err(Error::SourceRead { line: 1, .. })));
}

#[tokio::test]
async fn test_missing_source_is_unavailable() {
    let dir = tempdir().unwrap();
    let policy = RetryPolicy::new(3).without_delay();
    let result = open_source_with_retry(&dir.path().join("nope.gz"), &policy).await;

    match result {
        Err(Error::SourceUnavailable { message, .. }) => assert!(message.contains("3 attempts")),
        other => panic!("expected SourceUnavailable, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_line_reader_preserves_order_across_blocks() {
    let text: String = (0..10_000).map(|i| format!("{i}\n")).collect();
    let reader: SourceReader = Box::new(Cursor::new(text.into_bytes()));
    let (mut rx, handle) = spawn_line_reader(reader, "mem".to_string());

    let mut seen = Vec::new();
    while let Some(block) = rx.recv().await {
        seen.extend(block.unwrap());
    }
    handle.await.unwrap();

    assert_eq!(seen.len(), 10_000);
    assert!(seen.iter().enumerate().all(|(i, l)| *l == i.to_string()));
}

// ============================================================================
// Converter Tests
// ============================================================================

#[test]
fn test_config_paths() {
    let config = ConvertConfig::new("/data/ol_dump_authors_2025-06-30.txt.gz", "out/authors");
    assert_eq!(config.source_name(), "ol_dump_authors_2025-06-30.txt.gz");
    assert_eq!(config.dataset_name(), "authors");
    assert_eq!(config.stem(), "authors");
    assert_eq!(config.work_dir(), PathBuf::from("out"));

    let config = ConvertConfig::new("x.txt.gz", "bare");
    assert_eq!(config.work_dir(), PathBuf::from("."));
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let mut text = String::new();
    for i in 0..1000 {
        text.push_str(&dump_line(i));
        match i {
            100 => text.push_str("/type/work\t/works/X\t1\t2024\t{broken json\n"),
            500 => text.push_str("/type/work\t/works/Y\t1\t2024\t[1, 2, 3]\n"),
            900 => text.push_str("no tabs and no json\n"),
            _ => {}
        }
    }
    text.push('\n');
    let fixture = Fixture::works(&text);

    let mut config = fixture.config();
    config.batch_rows = 300;
    let remote = Arc::new(CountingRemote::new());
    let mut manifest = Manifest::new();

    let report = Converter::new(config, remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();

    assert_eq!(report.total_lines, 1004);
    assert_eq!(report.parsed, 1000);
    assert_eq!(report.malformed.count(), 3);
    assert_eq!(report.malformed.samples().len(), 3);
    assert_eq!(report.chunks.iter().map(|c| c.rows).sum::<usize>(), 1000);
    assert_eq!(report.chunk_names(), vec!["works/works.parquet"]);
    assert_eq!(remote.uploads.load(Ordering::SeqCst), 1);

    let entry = manifest.source("ol_dump_works_latest.txt.gz").unwrap();
    assert_eq!(manifest.chunk_names("ol_dump_works_latest.txt.gz"), report.chunk_names());
    assert!(entry.conversion.is_some());
    assert!(entry.source_last_modified.is_none());
}

#[tokio::test]
async fn test_rerun_with_same_parameters_is_skipped() {
    let text: String = (0..50).map(dump_line).collect();
    let fixture = Fixture::works(&text);
    let remote = Arc::new(CountingRemote::new());
    let mut manifest = Manifest::new();

    Converter::new(fixture.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();
    let after_first = manifest.clone();
    let uploads = remote.uploads.load(Ordering::SeqCst);

    let report = Converter::new(fixture.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();

    assert!(report.skipped);
    assert_eq!(remote.uploads.load(Ordering::SeqCst), uploads);
    assert_eq!(remote.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(manifest, after_first);
}

#[tokio::test]
async fn test_replaced_source_is_reconverted() {
    let text: String = (0..50).map(dump_line).collect();
    let fixture = Fixture::works(&text);
    let remote = Arc::new(CountingRemote::new());
    let mut manifest = Manifest::new();

    let first = Converter::new(fixture.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();
    assert_eq!(first.parsed, 50);

    let text: String = (0..80).map(dump_line).collect();
    gzip(&fixture.source, &[&text]);
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(&fixture.source)
        .unwrap()
        .set_modified(later)
        .unwrap();

    let second = Converter::new(fixture.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();

    assert!(!second.skipped);
    assert_eq!(second.parsed, 80);
    assert_eq!(remote.uploads.load(Ordering::SeqCst), 2);
    assert!(manifest
        .source("ol_dump_works_latest.txt.gz")
        .unwrap()
        .source_last_modified
        .is_none());
}

#[tokio::test]
async fn test_fetched_version_is_used_while_size_matches() {
    let text: String = (0..20).map(dump_line).collect();
    let fixture = Fixture::works(&text);
    let remote = Arc::new(CountingRemote::new());
    let upstream = "Tue, 01 Jul 2025 09:12:44 GMT";

    let mut manifest = Manifest::new();
    let entry = manifest.source_mut("ol_dump_works_latest.txt.gz");
    entry.source_last_modified = Some(upstream.to_string());
    entry.source_bytes = Some(std::fs::metadata(&fixture.source).unwrap().len());

    Converter::new(fixture.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();
    let stamp = manifest
        .source("ol_dump_works_latest.txt.gz")
        .and_then(|e| e.conversion.clone())
        .unwrap();
    assert_eq!(stamp.source_last_modified, upstream);

    // same bytes, new mtime: still the fetched version
    std::fs::File::options()
        .write(true)
        .open(&fixture.source)
        .unwrap()
        .set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(60))
        .unwrap();
    let report = Converter::new(fixture.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();
    assert!(report.skipped);

    // a different file under the same name is not that version
    let text: String = (0..25).map(dump_line).collect();
    gzip(&fixture.source, &[&text]);
    let report = Converter::new(fixture.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();
    assert!(!report.skipped);
    assert_eq!(report.parsed, 25);
}

#[tokio::test]
async fn test_force_and_changed_parameters_reconvert() {
    let text: String = (0..50).map(dump_line).collect();
    let fixture = Fixture::works(&text);
    let remote = Arc::new(CountingRemote::new());
    let mut manifest = Manifest::new();

    Converter::new(fixture.config(), remote.clone())
        .run(&mut manifest)
        .await
        .unwrap();

    let mut forced = fixture.config();
    forced.force = true;
    let report = Converter::new(forced, remote.clone()).run(&mut manifest).await.unwrap();
    assert!(!report.skipped);

    let mut smaller = fixture.config();
    smaller.batch_rows = 10;
    let report = Converter::new(smaller, remote.clone()).run(&mut manifest).await.unwrap();
    assert!(!report.skipped);
    assert_eq!(remote.uploads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dry_run_leaves_everything_untouched() {
    let text: String = (0..120).map(dump_line).collect();
    let fixture = Fixture::works(&text);
    let remote = Arc::new(CountingRemote::new());

    let mut manifest = Manifest::new();
    let stale = manifest.source_mut("ol_dump_works_latest.txt.gz");
    stale.record_chunk("works/works.part5.parquet");
    let before = manifest.clone();

    let mut config = fixture.config();
    config.dry_run = true;
    config.batch_rows = 40;
    let report = Converter::new(config, remote.clone()).run(&mut manifest).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.parsed, 120);
    assert_eq!(report.chunks.len(), 1);
    assert_eq!(report.reconcile.orphaned, vec!["works/works.part5.parquet"]);
    assert_eq!(remote.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(remote.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(manifest, before);
    assert!(!fixture.dir.path().join("out").exists());
}

#[tokio::test]
async fn test_missing_source_fails_before_any_upload() {
    let dir = tempdir().unwrap();
    let mut config = ConvertConfig::new(dir.path().join("ol_dump_works_latest.txt.gz"), dir.path().join("works"));
    config.source_retry = RetryPolicy::new(2).without_delay();
    let remote = Arc::new(CountingRemote::new());

    let err = Converter::new(config, remote.clone())
        .run(&mut Manifest::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SourceUnavailable { .. }));
    assert_eq!(remote.uploads.load(Ordering::SeqCst), 0);
}
