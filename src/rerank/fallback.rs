//! Term-overlap fallback reranker.
//!
//! Provides deterministic relevance scores when `FastEmbed` is not
//! available. Scores are the fraction of query terms present in the
//! document, weighted towards rarer (longer) terms.
//!
//! This is NOT semantic relevance - it's based on lexical overlap.
//! Use `FastEmbed` for true cross-encoder scoring.

use std::collections::HashSet;

use crate::Result;
use crate::rerank::Reranker;

/// Lexical-overlap reranker.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackReranker;

impl FallbackReranker {
    /// Creates a new fallback reranker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(query_terms: &HashSet<String>, document: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let doc_terms = Self::terms(document);
        let mut hit_weight = 0.0f32;
        let mut total_weight = 0.0f32;
        for term in query_terms {
            // Longer terms carry more signal than stop-word-length ones
            let weight = term.len() as f32;
            total_weight += weight;
            if doc_terms.contains(term) {
                hit_weight += weight;
            }
        }
        if total_weight == 0.0 {
            0.0
        } else {
            hit_weight / total_weight
        }
    }
}

impl Reranker for FallbackReranker {
    fn scores(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let query_terms = Self::terms(query);
        Ok(documents
            .iter()
            .map(|doc| Self::score(&query_terms, doc))
            .collect())
    }
}
