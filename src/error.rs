//! Error types for ol-dump-sync
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Per-line parse failures are deliberately *not* part of this enum: they are
//! recovered locally by the converter (see [`crate::normalize::LineError`]).

use thiserror::Error;

/// The main error type for ol-dump-sync
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Transfer Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Remote store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Transfer of '{path}' failed: {message}")]
    Transfer { path: String, message: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: Box<Error>,
    },

    // ============================================================================
    // Source Errors
    // ============================================================================
    #[error("Source '{path}' unavailable: {message}")]
    SourceUnavailable { path: String, message: String },

    #[error("Failed reading source '{path}' at line {line}: {message}")]
    SourceRead {
        path: String,
        line: u64,
        message: String,
    },

    // ============================================================================
    // Arrow/Parquet Errors
    // ============================================================================
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Output error: {message}")]
    Output { message: String },

    // ============================================================================
    // Manifest Errors
    // ============================================================================
    #[error("Manifest error: {message}")]
    Manifest { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a transfer error
    pub fn transfer(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a source-unavailable error
    pub fn source(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Create a manifest error
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }

    /// Check if this error is worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Transfer { .. } | Error::Io(_) => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            Error::ObjectStore(e) => !matches!(
                e,
                object_store::Error::NotImplemented
                    | object_store::Error::UnknownConfigurationKey { .. }
            ),
            Error::SourceUnavailable { .. } => true,
            _ => false,
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for ol-dump-sync
pub type Result<T> = std::result::Result<T, Error>;
