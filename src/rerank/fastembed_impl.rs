//! `FastEmbed`-based cross-encoder reranker.
//!
//! Scores (query, document) pairs with the bge-reranker-base model via
//! fastembed-rs. Only available when the `fastembed-embeddings` feature is
//! enabled.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;

use crate::Result;
use crate::error::StorageError;
use crate::rerank::Reranker;

/// Cross-encoder reranker over bge-reranker-base.
///
/// The model is loaded eagerly; inference is serialized behind a mutex
/// (the ONNX session is not `Sync`).
pub struct FastEmbedReranker {
    model: Mutex<fastembed::TextRerank>,
}

impl FastEmbedReranker {
    /// Creates a new cross-encoder reranker.
    ///
    /// # Errors
    ///
    /// Returns an error if model initialization fails.
    pub fn new() -> Result<Self> {
        tracing::info!(model = "bge-reranker-base", "initializing reranker");

        let options = fastembed::RerankInitOptions::new(fastembed::RerankerModel::BGERerankerBase)
            .with_show_download_progress(false);
        let model = fastembed::TextRerank::try_new(options)
            .map_err(|e| StorageError::Rerank(format!("failed to load reranker model: {e}")))?;

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Reranker for FastEmbedReranker {
    fn scores(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|e| StorageError::Rerank(format!("failed to lock reranker model: {e}")))?;

        // Wrap ONNX runtime call in catch_unwind for graceful degradation.
        let result = catch_unwind(AssertUnwindSafe(|| {
            model.rerank(query, documents.to_vec(), false, None)
        }));

        let ranked = result
            .map_err(|panic_info| {
                let panic_msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                crate::Error::Storage(StorageError::Rerank(format!(
                    "ONNX runtime panic: {panic_msg}"
                )))
            })?
            .map_err(|e| {
                crate::Error::Storage(StorageError::Rerank(format!("reranking failed: {e}")))
            })?;

        // fastembed returns results ordered by score; restore input order
        let mut scores = vec![0.0f32; documents.len()];
        for item in ranked {
            if let Some(slot) = scores.get_mut(item.index) {
                *slot = item.score;
            }
        }
        Ok(scores)
    }
}
