//! Text splitter trait definition.
//!
//! Defines the interface for all splitting strategies, enabling
//! pluggable text segmentation approaches.

use crate::error::Result;

/// Trait for splitting document text into ordered chunks.
///
/// Implementations must be `Send + Sync` so a single splitter instance can
/// serve concurrent ingestion calls. Each splitter should produce
/// consistent, deterministic output for the same input.
pub trait TextSplitter: Send + Sync {
    /// Splits the input text into ordered chunk strings.
    ///
    /// Empty input yields an empty list; whitespace-only pieces are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if splitting fails (e.g. invalid configuration
    /// or an embedding failure in the semantic strategy).
    fn split(&self, text: &str) -> Result<Vec<String>>;

    /// Returns the name of the splitting strategy.
    fn name(&self) -> &'static str;
}
