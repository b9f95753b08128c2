//! Reassemble chunk parts into one Parquet file
//!
//! Parts are read in chunk order (`{base}.parquet`, `{base}.part1.parquet`,
//! …), their schemas merged, and every batch aligned to the merged schema.

use super::writer::{ParquetWriter, ParquetWriterConfig};
use crate::error::{Error, Result};
use crate::schema::{align_batch, merge_schemas, resolve_null_columns};
use arrow::datatypes::Schema;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Result of a stitch run
#[derive(Debug, Clone)]
pub struct StitchReport {
    /// Parts consumed, in order
    pub parts: Vec<PathBuf>,
    /// Rows written to the combined file
    pub rows: usize,
    /// Combined file
    pub output: PathBuf,
}

/// Position of a file in the chunk sequence of `base`, if it belongs to it
pub fn part_index(base: &str, file_name: &str) -> Option<usize> {
    if file_name == format!("{base}.parquet") {
        return Some(0);
    }

    file_name
        .strip_prefix(base)?
        .strip_prefix(".part")?
        .strip_suffix(".parquet")?
        .parse()
        .ok()
}

/// List the parts of `base` in `dir`, ordered by part index
pub fn find_parts(dir: impl AsRef<Path>, base: &str) -> Result<Vec<PathBuf>> {
    let mut parts: Vec<(usize, PathBuf)> = Vec::new();

    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(idx) = part_index(base, &name) {
            parts.push((idx, entry.path()));
        }
    }

    parts.sort_by_key(|(idx, _)| *idx);
    Ok(parts.into_iter().map(|(_, path)| path).collect())
}

/// Combine all parts of `base` found in `input_dir` into
/// `{output_dir}/{base}.full.parquet`
pub fn stitch_parts(
    input_dir: impl AsRef<Path>,
    base: &str,
    output_dir: impl AsRef<Path>,
    config: &ParquetWriterConfig,
) -> Result<StitchReport> {
    let parts = find_parts(input_dir.as_ref(), base)?;
    if parts.is_empty() {
        return Err(Error::FileNotFound {
            path: format!("{}/{base}*.parquet", input_dir.as_ref().display()),
        });
    }
    info!("Found {} parquet parts for {base}", parts.len());

    let mut merged = Schema::empty();
    for part in &parts {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(part)?)?;
        merged = merge_schemas(&merged, builder.schema());
    }
    let merged = Arc::new(resolve_null_columns(&merged));

    std::fs::create_dir_all(output_dir.as_ref())?;
    let output = output_dir.as_ref().join(format!("{base}.full.parquet"));
    let mut writer = ParquetWriter::create(&output, Arc::clone(&merged), config)?;

    for part in &parts {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(part)?)?.build()?;
        for batch in reader {
            writer.write(&align_batch(&batch?, &merged)?)?;
        }
    }

    let (rows, bytes) = writer.close()?;
    info!("Combined {rows} rows into {} ({bytes} bytes)", output.display());

    Ok(StitchReport {
        parts,
        rows,
        output,
    })
}
