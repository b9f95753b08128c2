//! Output module
//!
//! Parquet writing for chunk parts, and reassembly of parts into one file.

mod stitch;
mod writer;

pub use stitch::{find_parts, part_index, stitch_parts, StitchReport};
pub use writer::{ParquetWriter, ParquetWriterConfig};
