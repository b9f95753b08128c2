//! CLI module
//!
//! Command-line interface for syncing OpenLibrary dumps.
//!
//! # Commands
//!
//! - `convert` - Convert a dump into Parquet chunks and publish them
//! - `fetch` - Download changed dumps and upload the raw files
//! - `clean` - Delete every recorded chunk of a dump
//! - `stitch` - Combine local chunk parts into one file

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
