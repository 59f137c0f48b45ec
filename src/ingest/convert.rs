//! Extension-dispatched conversion of source files to plain text.
//!
//! Structured text formats are read verbatim, JSON files are projected
//! through a configured selector expression and re-serialized, tabular
//! files become one JSON record per row, and everything else on the
//! allow-list goes through a pluggable [`DocumentConverter`]. All reads
//! decode bytes lossily so a stray invalid sequence cannot fail a file.

use std::path::Path;

use serde_json::Value;

use crate::error::{IngestError, Result};

/// General binary-document-to-text converter.
///
/// The default implementation reads bytes as lossy UTF-8; deployments with
/// richer formats plug in their own.
pub trait DocumentConverter: Send + Sync {
    /// Converts the file at `path` to plain text.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or converted.
    fn convert(&self, path: &Path) -> Result<String>;
}

/// Default converter: lossy UTF-8 decoding of the raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextConverter;

impl DocumentConverter for PlainTextConverter {
    fn convert(&self, path: &Path) -> Result<String> {
        read_lossy(path)
    }
}

/// Result of converting one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertedDocument {
    /// Plain text to be run through the splitter.
    Text(String),
    /// Pre-chunked records (tabular input bypasses the splitter).
    Records(Vec<String>),
}

/// Converts a file according to its extension.
///
/// # Arguments
///
/// * `path` - Source file.
/// * `file_type` - Lowercased extension.
/// * `json_selector` - Dotted-path selector applied to JSON documents.
/// * `csv_separator` - Field separator for tabular files.
/// * `converter` - Fallback converter for other allow-listed types.
///
/// # Errors
///
/// Returns an error if the file cannot be read or converted.
pub fn convert_file(
    path: &Path,
    file_type: &str,
    json_selector: &str,
    csv_separator: u8,
    converter: &dyn DocumentConverter,
) -> Result<ConvertedDocument> {
    match file_type {
        "txt" | "md" | "xml" => Ok(ConvertedDocument::Text(read_lossy(path)?)),
        "json" => {
            let content = read_lossy(path)?;
            let value: Value =
                serde_json::from_str(&content).map_err(|e| IngestError::ConvertFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            let projected = apply_selector(&value, json_selector).ok_or_else(|| {
                IngestError::ConvertFailed {
                    path: path.display().to_string(),
                    reason: format!("selector {json_selector} matched nothing"),
                }
            })?;
            let text =
                serde_json::to_string(&projected).map_err(|e| IngestError::ConvertFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            Ok(ConvertedDocument::Text(text))
        }
        "csv" => Ok(ConvertedDocument::Records(read_records(
            path,
            csv_separator,
        )?)),
        _ => Ok(ConvertedDocument::Text(converter.convert(path)?)),
    }
}

/// Reads a file as lossy UTF-8 text.
fn read_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| IngestError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Applies a dotted-path selector (`.`, `.field`, `.a.b`) to a JSON value.
fn apply_selector<'a>(value: &'a Value, selector: &str) -> Option<&'a Value> {
    let trimmed = selector.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Some(value);
    }
    let pointer: String = trimmed
        .trim_start_matches('.')
        .split('.')
        .fold(String::new(), |mut acc, part| {
            acc.push('/');
            acc.push_str(part);
            acc
        });
    value.pointer(&pointer)
}

/// Parses a tabular file into one serialized JSON object per row.
fn read_records(path: &Path, separator: u8) -> Result<Vec<String>> {
    let content = read_lossy(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(separator)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::ConvertFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| IngestError::ConvertFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut object = serde_json::Map::new();
        for (i, header) in headers.iter().enumerate() {
            object.insert(
                header.clone(),
                Value::String(row.get(i).unwrap_or_default().to_string()),
            );
        }
        let serialized =
            serde_json::to_string(&Value::Object(object)).map_err(|e| {
                IngestError::ConvertFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
        records.push(serialized);
    }
    Ok(records)
}
