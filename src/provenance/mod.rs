//! Per-document attribution of generated answers.
//!
//! Three strategies score how much each retrieved document contributed to
//! the final answer: cross-encoder scoring of (answer, document) pairs,
//! asking the LLM for a 0-1 judgment per document, or cosine attribution
//! in embedding space. Scores are merged into the documents by the
//! pipeline.

use crate::core::RetrievedDocument;
use crate::embedding::{Embedder, cosine_similarity};
use crate::error::Result;
use crate::llm::LlmGateway;
use crate::rerank::Reranker;

/// Scores documents against the answer with the cross-encoder reranker.
///
/// # Errors
///
/// Returns an error if scoring fails.
pub fn compute_rerank_provenance(
    reranker: &dyn Reranker,
    answer: &str,
    documents: &[RetrievedDocument],
) -> Result<Vec<f64>> {
    let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
    let scores = reranker.scores(answer, &texts)?;
    Ok(scores.into_iter().map(f64::from).collect())
}

/// Asks the LLM for a 0-1 contribution score per document.
///
/// Replies that carry no parseable number score 0.
///
/// # Errors
///
/// Returns an error if an LLM call fails.
pub async fn compute_llm_provenance(
    gateway: &LlmGateway,
    question: &str,
    answer: &str,
    documents: &[RetrievedDocument],
) -> Result<Vec<f64>> {
    let mut scores = Vec::with_capacity(documents.len());
    for doc in documents {
        let prompt = format!(
            "Rate from 0 to 1 how much the document below contributed to the answer. \
             Respond with a single number and nothing else.\n\n\
             Question: {question}\n\nAnswer: {answer}\n\nDocument:\n{content}",
            content = doc.content,
        );
        let (reply, _) = gateway.respond(None, &prompt, &[]).await?;
        scores.push(parse_score(&reply).unwrap_or(0.0));
    }
    Ok(scores)
}

/// Cosine attribution of the answer against each document in embedding
/// space.
///
/// # Errors
///
/// Returns an error if embedding fails.
pub fn compute_similarity_provenance(
    embedder: &dyn Embedder,
    answer: &str,
    documents: &[RetrievedDocument],
) -> Result<Vec<f64>> {
    let answer_embedding = embedder.embed(answer)?;
    let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
    let doc_embeddings = embedder.embed_batch(&texts)?;

    Ok(doc_embeddings
        .iter()
        .map(|doc_embedding| f64::from(cosine_similarity(&answer_embedding, doc_embedding)))
        .collect())
}

/// Extracts the first number from an LLM reply, clamped to `0.0..=1.0`.
fn parse_score(reply: &str) -> Option<f64> {
    reply
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .filter(|token| !token.is_empty())
        .find_map(|token| token.parse::<f64>().ok())
        .map(|score| score.clamp(0.0, 1.0))
}
