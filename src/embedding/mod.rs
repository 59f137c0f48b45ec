//! Embedding generation for dense retrieval.
//!
//! Provides embedding generation using fastembed (when available) or a
//! hash-based fallback for deterministic pseudo-embeddings.
//!
//! # Feature Flags
//!
//! - `fastembed-embeddings`: Enables `FastEmbed` models (all-MiniLM-L6-v2
//!   by default, 384 dimensions)
//! - Without the feature: Uses hash-based fallback (deterministic but not
//!   semantic)

mod fallback;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use fallback::FallbackEmbedder;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use std::sync::Arc;

use crate::Result;
use crate::config::Settings;

/// Default embedding dimensions for the all-MiniLM-L6-v2 model.
///
/// This is the authoritative source for embedding dimensions across the
/// codebase when no model is configured.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators.
///
/// Implementations must be thread-safe (`Send + Sync`) to support
/// concurrent embedding during ingestion and retrieval.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// The default implementation calls `embed` for each text sequentially.
    /// Implementations may override this for batch optimization.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails for any text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Creates the configured embedder.
///
/// - With `fastembed-embeddings`: Returns a `FastEmbedEmbedder` for the
///   model named by the `embedding_model` option
/// - Without: Returns a `FallbackEmbedder`
///
/// # Errors
///
/// Returns an error if embedder initialization fails.
#[cfg(feature = "fastembed-embeddings")]
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(FastEmbedEmbedder::new(settings)?))
}

/// Creates the configured embedder.
///
/// - With `fastembed-embeddings`: Returns a `FastEmbedEmbedder` for the
///   model named by the `embedding_model` option
/// - Without: Returns a `FallbackEmbedder`
///
/// # Errors
///
/// Returns an error if embedder initialization fails (never fails for
/// the fallback).
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_embedder(_settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)))
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value between -1.0 (opposite) and 1.0 (identical).
/// For normalized vectors (L2 norm = 1), this is equivalent to the dot
/// product. Returns 0.0 if vectors have different lengths or zero
/// magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
