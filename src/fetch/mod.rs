//! Raw dump fetching
//!
//! Keeps the remote copy of the upstream dumps current: compares the
//! upstream `Last-Modified` header with the manifest, downloads changed dumps,
//! uploads them under the raw prefix and records the new version.

mod client;
mod sync;

pub use client::DumpFetcher;
pub use sync::{sync_dumps, FetchAction, FetchOptions, FetchOutcome};
