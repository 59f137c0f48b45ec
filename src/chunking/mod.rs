//! Text splitting strategies for document ingestion.
//!
//! This module provides a trait-based system for splitting document text
//! into retrievable chunks. Three strategies are available:
//!
//! - **`RecursiveCharacterTextSplitter`**: separator-cascade splitting with
//!   configurable size and overlap
//! - **`SemanticChunker`**: embedding-breakpoint splitting at sentence
//!   boundaries
//! - **`ParagraphChunker`**: paragraph packing up to a maximum chunk size

pub mod paragraph;
pub mod recursive;
pub mod semantic;
pub mod traits;

pub use paragraph::ParagraphSplitter;
pub use recursive::RecursiveCharacterSplitter;
pub use semantic::SemanticSplitter;
pub use traits::TextSplitter;

use std::sync::Arc;

use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::{ChunkingError, Result};

/// Creates the configured splitter strategy.
///
/// # Arguments
///
/// * `settings` - Configuration snapshot naming the strategy and its
///   parameters.
/// * `embedder` - Embedder shared with the semantic strategy.
///
/// # Errors
///
/// Returns [`ChunkingError::UnknownStrategy`] for unrecognized strategy
/// names, or a configuration error from the strategy constructor.
pub fn create_splitter(
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn TextSplitter>> {
    match settings.splitter() {
        "RecursiveCharacterTextSplitter" => Ok(Arc::new(RecursiveCharacterSplitter::new(
            settings.recursive_splitter_chunk_size(),
            settings.recursive_splitter_chunk_overlap(),
        )?)),
        "SemanticChunker" => Ok(Arc::new(SemanticSplitter::new(
            embedder,
            settings.semantic_chunker_breakpoint_percentile(),
        ))),
        "ParagraphChunker" => Ok(Arc::new(ParagraphSplitter::new(
            settings.paragraph_chunker_max_chunk_size(),
            settings.paragraph_chunker_paragraph_separator(),
        )?)),
        other => Err(ChunkingError::UnknownStrategy {
            name: other.to_string(),
        }
        .into()),
    }
}

/// Lists available splitter strategy names.
#[must_use]
pub fn available_strategies() -> Vec<&'static str> {
    vec![
        "RecursiveCharacterTextSplitter",
        "SemanticChunker",
        "ParagraphChunker",
    ]
}
