//! Sync manifest
//!
//! The manifest records, per source dump file, when it was last modified
//! upstream, when it was last synced, and which converted chunks currently
//! exist on the remote store.
//!
//! It is loaded once per run, threaded through the run as a plain value, and
//! written back once after every upload and orphan deletion has settled.
//!
//! # Example
//!
//! ```json
//! {
//!   "ol_dump_authors_latest.txt.gz": {
//!     "source_last_modified": "Tue, 01 Jul 2025 09:12:44 GMT",
//!     "last_synced": "2025-07-02T10:00:00.000000Z",
//!     "converted_chunks": {
//!       "authors/authors.parquet": { "converted": true, "last_synced": "2025-07-02T10:41:07.120934Z" }
//!     }
//!   }
//! }
//! ```

mod reconcile;
mod store;
mod types;

pub use reconcile::{find_orphans, ReconcileReport, Reconciler};
pub use store::{ManifestStore, DEFAULT_MANIFEST_PATH};
pub use types::{ChunkEntry, ConversionStamp, Manifest, SourceEntry};
