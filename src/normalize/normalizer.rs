//! Line and record normalization

use crate::types::{JsonValue, Record};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

/// Fields whose value is an OpenLibrary text block (`{"type": "/type/text", "value": "..."}`)
pub const DEFAULT_RICH_TEXT_FIELDS: &[&str] = &["bio", "notes", "description", "first_sentence"];

/// Longest prefix of a malformed line kept for diagnostics
const SAMPLE_CHARS: usize = 200;

/// Default number of malformed lines kept for diagnostics
const DEFAULT_SAMPLE_LIMIT: usize = 5;

static DUMP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ol_dump_([A-Za-z]+)_(?:latest|\d{4}-\d{2}-\d{2})").expect("valid dump name regex")
});

/// Why a single line could not be turned into a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("JSON payload is not an object")]
    NotAnObject,
}

/// Pure transform from raw dump lines to scalar-only records
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    rich_text_fields: Vec<String>,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::with_rich_text_fields(DEFAULT_RICH_TEXT_FIELDS.iter().copied())
    }
}

impl RecordNormalizer {
    /// Create a normalizer with the default rich-text field list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a normalizer with a custom rich-text field list
    pub fn with_rich_text_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rich_text_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Fields collapsed to their inner `value` text
    pub fn rich_text_fields(&self) -> &[String] {
        &self.rich_text_fields
    }

    /// Normalize one tab-delimited dump line; the last field is the JSON payload
    pub fn normalize_line(&self, line: &str) -> Result<Record, LineError> {
        let payload = line.trim().rsplit('\t').next().unwrap_or_default();
        let value: JsonValue =
            serde_json::from_str(payload).map_err(|e| LineError::InvalidJson(e.to_string()))?;
        self.normalize_value(value)
    }

    /// Normalize an already parsed JSON document
    pub fn normalize_value(&self, value: JsonValue) -> Result<Record, LineError> {
        let JsonValue::Object(mut record) = value else {
            return Err(LineError::NotAnObject);
        };

        for (key, value) in &mut record {
            let original = std::mem::take(value);
            *value = if self.is_rich_text(key) {
                collapse_rich_text(original)
            } else {
                collapse_nested(original)
            };
        }

        Ok(record)
    }

    fn is_rich_text(&self, key: &str) -> bool {
        self.rich_text_fields.iter().any(|f| f == key)
    }
}

/// `{"type": "/type/text", "value": "x"}` → `"x"`; other non-strings become JSON text.
fn collapse_rich_text(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(mut obj) => match obj.remove("value") {
            None => JsonValue::String(String::new()),
            Some(JsonValue::String(s)) => JsonValue::String(s),
            Some(JsonValue::Null) => JsonValue::Null,
            Some(other) => JsonValue::String(other.to_string()),
        },
        JsonValue::String(_) | JsonValue::Null => value,
        other => JsonValue::String(other.to_string()),
    }
}

/// Objects and arrays become their JSON text; scalars pass through.
fn collapse_nested(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(_) | JsonValue::Array(_) => JsonValue::String(value.to_string()),
        scalar => scalar,
    }
}

/// Counter for skipped lines with a bounded diagnostic sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLines {
    count: u64,
    samples: Vec<String>,
    sample_limit: usize,
}

impl Default for MalformedLines {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_LIMIT)
    }
}

impl MalformedLines {
    /// Keep at most `sample_limit` raw lines
    pub fn new(sample_limit: usize) -> Self {
        Self {
            count: 0,
            samples: Vec::with_capacity(sample_limit),
            sample_limit,
        }
    }

    /// Count a malformed line, keeping its prefix if the sample has room
    pub fn record(&mut self, line: &str) {
        self.count += 1;
        if self.samples.len() < self.sample_limit {
            self.samples
                .push(line.trim().chars().take(SAMPLE_CHARS).collect());
        }
    }

    /// Number of malformed lines seen
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The retained sample, in encounter order
    pub fn samples(&self) -> &[String] {
        &self.samples
    }
}

/// Dataset directory for a dump file: `ol_dump_authors_latest.txt.gz` → `authors`
///
/// Falls back to the file name up to its first dot.
pub fn dataset_name_for(path: impl AsRef<Path>) -> String {
    let file_name = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if let Some(caps) = DUMP_NAME.captures(&file_name) {
        return caps[1].to_lowercase();
    }

    file_name
        .split('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}
