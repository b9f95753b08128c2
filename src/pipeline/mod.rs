//! Conversion pipeline
//!
//! Wires the stages of a conversion together:
//!
//! source dump → line reader → [`RecordNormalizer`](crate::normalize::RecordNormalizer)
//! → [`BatchWriter`](crate::batch::BatchWriter) → [`ChunkSink`](crate::chunk::ChunkSink)
//! → [`Reconciler`](crate::manifest::Reconciler)
//!
//! There is a single logical worker; the only concurrency is the blocking
//! reader feeding lines ahead of the converter.

mod converter;
mod source;

pub use converter::{ConversionReport, ConvertConfig, Converter};
pub use source::{open_source, open_source_with_retry, spawn_line_reader, SourceLines, SourceReader};

#[cfg(test)]
mod tests;
