//! `FastEmbed`-based semantic embedder.
//!
//! Provides real semantic embeddings via fastembed-rs. Only available when
//! the `fastembed-embeddings` feature is enabled. The model is selected
//! from the `embedding_model` option; unknown names fall back to
//! all-MiniLM-L6-v2.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;

use crate::Result;
use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::StorageError;

/// `FastEmbed` embedder over a configurable ONNX model.
///
/// The model is loaded eagerly at engine construction; inference is
/// serialized behind a mutex (the ONNX session is not `Sync`).
pub struct FastEmbedEmbedder {
    model: Mutex<fastembed::TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

/// Maps a configured model name to a fastembed model and its dimensions.
fn resolve_model(name: &str) -> (fastembed::EmbeddingModel, usize) {
    match name {
        "BAAI/bge-small-en-v1.5" => (fastembed::EmbeddingModel::BGESmallENV15, 384),
        "BAAI/bge-base-en-v1.5" => (fastembed::EmbeddingModel::BGEBaseENV15, 768),
        "mixedbread-ai/mxbai-embed-large-v1" => {
            (fastembed::EmbeddingModel::MxbaiEmbedLargeV1, 1024)
        }
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            (fastembed::EmbeddingModel::AllMiniLML6V2, 384)
        }
        other => {
            tracing::warn!(model = other, "unknown embedding model, using all-MiniLM-L6-v2");
            (fastembed::EmbeddingModel::AllMiniLML6V2, 384)
        }
    }
}

impl FastEmbedEmbedder {
    /// Creates a new `FastEmbed` embedder for the configured model.
    ///
    /// # Errors
    ///
    /// Returns an error if model initialization fails.
    pub fn new(settings: &Settings) -> Result<Self> {
        let model_name = settings.embedding_model().to_string();
        let (model_kind, dimensions) = resolve_model(&model_name);

        tracing::info!(
            model = %model_name,
            dimensions,
            cpu = settings.embedding_cpu(),
            "initializing embedding model"
        );

        let options = fastembed::InitOptions::new(model_kind).with_show_download_progress(false);
        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            StorageError::Embedding(format!("failed to load embedding model: {e}"))
        })?;

        Ok(Self {
            model: Mutex::new(model),
            model_name,
            dimensions,
        })
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn run_embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|e| StorageError::Embedding(format!("failed to lock embedding model: {e}")))?;

        // Wrap ONNX runtime call in catch_unwind for graceful degradation.
        // ONNX runtime can panic on malformed inputs or internal errors.
        let result = catch_unwind(AssertUnwindSafe(|| model.embed(texts.to_vec(), None)));

        result
            .map_err(|panic_info| {
                let panic_msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                crate::Error::Storage(StorageError::Embedding(format!(
                    "ONNX runtime panic: {panic_msg}"
                )))
            })?
            .map_err(|e| {
                crate::Error::Storage(StorageError::Embedding(format!("embedding failed: {e}")))
            })
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(StorageError::Embedding("cannot embed empty text".to_string()).into());
        }

        self.run_embed(&[text])?.into_iter().next().ok_or_else(|| {
            StorageError::Embedding("no embedding returned from model".to_string()).into()
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(StorageError::Embedding("cannot embed empty text".to_string()).into());
        }

        self.run_embed(texts)
    }
}
