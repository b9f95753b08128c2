// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # ol-dump-sync
//!
//! Streaming converter from OpenLibrary dump files to size-capped Parquet
//! chunks, published to a remote object store and tracked in a JSON manifest.
//!
//! ## Features
//!
//! - **Streaming conversion**: gzip dumps are read line by line, never fully in memory
//! - **Schema evolution**: a chunk is closed when a batch no longer fits its schema
//! - **Size-capped chunks**: a new part is started once a part reaches the cap
//! - **Manifest reconciliation**: chunks that were not reproduced are deleted remotely
//! - **Raw dump sync**: changed upstream dumps are downloaded and uploaded
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ol_dump_sync::manifest::ManifestStore;
//! use ol_dump_sync::pipeline::{ConvertConfig, Converter};
//! use ol_dump_sync::remote::ObjectStoreRemote;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ol_dump_sync::Result<()> {
//!     let remote = Arc::new(ObjectStoreRemote::parse("s3://bucket/openlibrary")?);
//!     let store = ManifestStore::new("ol_sync_manifest.json");
//!     let mut manifest = store.load().await?;
//!
//!     let config = ConvertConfig::new("ol_dump_works_latest.txt.gz", "out/works");
//!     let report = Converter::new(config, remote).run(&mut manifest).await?;
//!     report.log_summary();
//!
//!     store.save(&manifest).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌───────────┐   ┌──────────┐
//! │  Source  │ → │ Normalize │ → │  Batch  │ → │ ChunkSink │ → │  Remote  │
//! │ gzip/txt │   │  records  │   │  rows   │   │  parquet  │   │  upload  │
//! └──────────┘   └───────────┘   └─────────┘   └───────────┘   └──────────┘
//!                                                    │
//!                                              ┌─────┴─────┐
//!                                              │ Manifest  │
//!                                              │ reconcile │
//!                                              └───────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the crate
pub mod error;

/// Common types and type aliases
pub mod types;

/// Retry policy and retry loop
pub mod retry;

/// Settings file and environment overrides
pub mod config;

/// Dump line parsing and record normalization
pub mod normalize;

/// Schema inference, compatibility and batch conversion
pub mod schema;

/// Row batching
pub mod batch;

/// Parquet writing and part stitching
pub mod output;

/// Remote object store transfers
pub mod remote;

/// Size-capped chunk production
pub mod chunk;

/// Sync manifest and orphan reconciliation
pub mod manifest;

/// Conversion driver
pub mod pipeline;

/// Upstream dump download and raw upload
pub mod fetch;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use manifest::{Manifest, ManifestStore};
pub use pipeline::{ConversionReport, ConvertConfig, Converter};
pub use remote::{ObjectStoreRemote, RemoteStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
