//! Semantic splitting strategy.
//!
//! Splits at embedding-space breakpoints: sentences are embedded, cosine
//! distances between consecutive sentences are computed, and a new chunk
//! starts wherever the distance exceeds a percentile threshold over all
//! gaps. Uses `unicode-segmentation` sentence bounds for proper
//! international text handling.

use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::chunking::traits::TextSplitter;
use crate::embedding::{Embedder, cosine_similarity};
use crate::error::Result;

/// Embedding-breakpoint splitter.
///
/// Sentences whose consecutive cosine distance falls above the configured
/// percentile of all gap distances start a new chunk. A text with fewer
/// than two sentences is returned as a single chunk.
pub struct SemanticSplitter {
    embedder: Arc<dyn Embedder>,
    breakpoint_percentile: f64,
}

impl SemanticSplitter {
    /// Creates a splitter over the given embedder.
    ///
    /// `breakpoint_percentile` is clamped to `0.0..=100.0`.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, breakpoint_percentile: f64) -> Self {
        Self {
            embedder,
            breakpoint_percentile: breakpoint_percentile.clamp(0.0, 100.0),
        }
    }

    /// Returns the value at the configured percentile of `values`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn percentile_threshold(&self, values: &[f64]) -> f64 {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rank = (self.breakpoint_percentile / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }
}

impl TextSplitter for SemanticSplitter {
    fn split(&self, text: &str) -> Result<Vec<String>> {
        let sentences: Vec<&str> = text
            .split_sentence_bounds()
            .filter(|s| !s.trim().is_empty())
            .collect();

        if sentences.is_empty() {
            return Ok(Vec::new());
        }
        if sentences.len() == 1 {
            return Ok(vec![sentences[0].to_string()]);
        }

        let embeddings = self.embedder.embed_batch(&sentences)?;

        let distances: Vec<f64> = embeddings
            .windows(2)
            .map(|pair| 1.0 - f64::from(cosine_similarity(&pair[0], &pair[1])))
            .collect();
        let threshold = self.percentile_threshold(&distances);

        let mut chunks = Vec::new();
        let mut current = String::from(sentences[0]);
        for (i, sentence) in sentences.iter().enumerate().skip(1) {
            if distances[i - 1] > threshold {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(sentence);
        }
        if !current.trim().is_empty() {
            chunks.push(current);
        }
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "SemanticChunker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DEFAULT_DIMENSIONS, FallbackEmbedder};

    fn splitter(percentile: f64) -> SemanticSplitter {
        SemanticSplitter::new(
            Arc::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)),
            percentile,
        )
    }

    #[test]
    fn test_empty_text() {
        assert!(splitter(95.0).split("").unwrap().is_empty());
    }

    #[test]
    fn test_single_sentence() {
        let chunks = splitter(95.0).split("Just one sentence.").unwrap();
        assert_eq!(chunks, vec!["Just one sentence."]);
    }

    #[test]
    fn test_no_text_lost() {
        let text = "The cat sat on the mat. Quantum field theory is hard. The cat purred loudly. \
                    Renormalization removes divergences.";
        let chunks = splitter(50.0).split(text).unwrap();
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_low_percentile_splits_more() {
        let text = "The cat sat on the mat. Quantum field theory is hard. The cat purred loudly. \
                    Renormalization removes divergences.";
        let low = splitter(0.0).split(text).unwrap();
        let high = splitter(100.0).split(text).unwrap();
        assert!(low.len() >= high.len());
    }

    #[test]
    fn test_percentile_threshold() {
        let s = splitter(50.0);
        let values = vec![0.1, 0.2, 0.3, 0.4, 0.5];
        let t = s.percentile_threshold(&values);
        assert!((t - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let text = "First sentence here. Second sentence here. Third one differs completely.";
        let a = splitter(90.0).split(text).unwrap();
        let b = splitter(90.0).split(text).unwrap();
        assert_eq!(a, b);
    }
}
