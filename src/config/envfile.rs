//! Line-oriented `KEY=VALUE` configuration file handling.
//!
//! The config file is the single source of persisted options. Updates keep
//! the existing line order and comments intact and append previously unknown
//! keys at the end, so a hand-edited file survives programmatic writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// In-memory representation of a `KEY=VALUE` config file.
///
/// Lines are kept verbatim; only lines holding an updated key are rewritten.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<String>,
}

impl EnvFile {
    /// Loads the file at `path`. A missing file yields an empty document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lines = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::File {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            content.lines().map(ToString::to_string).collect()
        } else {
            Vec::new()
        };
        Ok(Self { path, lines })
    }

    /// Returns the path this document was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses all `KEY=VALUE` pairs, skipping blank lines and `#` comments.
    ///
    /// Surrounding double quotes on values are stripped.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for line in &self.lines {
            if let Some((key, value)) = parse_line(line) {
                map.insert(key.to_string(), value.to_string());
            }
        }
        map
    }

    /// Applies `changes`, rewriting matching lines in place and appending
    /// new keys at the end. Returns the set of keys written.
    pub fn update(&mut self, changes: &BTreeMap<String, String>) -> Vec<String> {
        let mut remaining: BTreeMap<&str, &str> = changes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        for line in &mut self.lines {
            if let Some((key, _)) = parse_line(line)
                && let Some(value) = remaining.remove(key.as_str())
            {
                *line = format!("{key}={value}");
            }
        }

        // Keys not present in the file yet
        for (key, value) in &remaining {
            self.lines.push(format!("{key}={value}"));
        }

        changes.keys().cloned().collect()
    }

    /// Writes the document back to its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let mut content = self.lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(&self.path, content).map_err(|e| ConfigError::File {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Parses a single line into a key-value pair, or `None` for comments,
/// blank lines, and lines without `=`.
fn parse_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let mut value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value = &value[1..value.len() - 1];
    }
    Some((key.to_string(), value.to_string()))
}
