//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// OpenLibrary dump sync CLI
#[derive(Parser, Debug)]
#[command(name = "ol-dump-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (YAML)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Remote store (local path or cloud URL)
    /// Supports: /path, s3://bucket/path, r2://bucket/path, gs://bucket/path, az://container/path
    #[arg(short, long, global = true)]
    pub remote: Option<String>,

    /// Manifest file (JSON)
    #[arg(short, long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Summary format
    #[arg(short, long, global = true, default_value = "pretty")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a dump into size-capped Parquet chunks and upload them
    Convert {
        /// Dump file (.txt.gz or plain text)
        input: PathBuf,

        /// Local path prefix of the chunks, e.g. `out/works`
        output_prefix: PathBuf,

        /// Remote directory (default: derived from the dump name)
        #[arg(long)]
        dataset: Option<String>,

        /// Report what would happen without writing, uploading or deleting
        #[arg(long)]
        dry_run: bool,

        /// Convert even if the manifest records this exact conversion
        #[arg(long)]
        force: bool,

        /// Rows per batch
        #[arg(long)]
        batch_rows: Option<usize>,

        /// Chunk size cap in bytes
        #[arg(long)]
        max_chunk_bytes: Option<u64>,
    },

    /// Download changed dumps and upload the raw files
    Fetch {
        /// Only this dump file
        #[arg(long)]
        only: Option<String>,

        /// Keep local copies after upload
        #[arg(long)]
        keep: bool,

        /// Report what would happen without any network call
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete every converted chunk recorded for a dump
    Clean {
        /// Dump file name as recorded in the manifest
        source: String,

        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Combine chunk parts into `{base}.full.parquet`
    Stitch {
        /// Directory holding the parts
        dir: PathBuf,

        /// Part base name, e.g. `works`
        base: String,

        /// Where to write the combined file (default: the input directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

/// Summary format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Human-readable output
    Pretty,
}
