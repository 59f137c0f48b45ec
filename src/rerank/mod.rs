//! Candidate reranking against a query.
//!
//! Provides cross-encoder scoring using fastembed (when available) or a
//! deterministic lexical-overlap fallback.
//!
//! # Feature Flags
//!
//! - `fastembed-embeddings`: Enables the `FastEmbed` cross-encoder
//!   (bge-reranker-base)
//! - Without the feature: Uses term-overlap scoring (deterministic but
//!   not semantic)

mod fallback;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use fallback::FallbackReranker;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedReranker;

use std::sync::Arc;

use crate::Result;
use crate::core::RetrievedDocument;

/// Trait for candidate rerankers.
///
/// Scoring is pure and idempotent: the same (query, documents) input
/// yields the same scores, and no side effects are performed.
pub trait Reranker: Send + Sync {
    /// Returns one relevance score per input document (higher is more
    /// relevant to the query).
    ///
    /// # Errors
    ///
    /// Returns an error if scoring fails.
    fn scores(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// Creates the default reranker based on available features.
///
/// # Errors
///
/// Returns an error if model initialization fails.
#[cfg(feature = "fastembed-embeddings")]
pub fn create_reranker() -> Result<Arc<dyn Reranker>> {
    Ok(Arc::new(FastEmbedReranker::new()?))
}

/// Creates the default reranker based on available features.
///
/// # Errors
///
/// Returns an error if model initialization fails (never fails for the
/// fallback).
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_reranker() -> Result<Arc<dyn Reranker>> {
    Ok(Arc::new(FallbackReranker::new()))
}

/// Re-scores documents against the query and returns them ordered by
/// descending rerank score.
///
/// The rerank score replaces each document's `score`; ties are broken by
/// id lexicographic order. Truncation to `rerank_k` is the caller's
/// responsibility.
///
/// # Errors
///
/// Returns an error if scoring fails.
pub fn rerank_documents(
    reranker: &dyn Reranker,
    query: &str,
    mut documents: Vec<RetrievedDocument>,
) -> Result<Vec<RetrievedDocument>> {
    if documents.is_empty() {
        return Ok(documents);
    }

    let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
    let scores = reranker.scores(query, &texts)?;

    for (doc, score) in documents.iter_mut().zip(&scores) {
        doc.score = Some(f64::from(*score));
    }
    documents.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    Ok(documents)
}
