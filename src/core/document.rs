//! Document chunk representation.
//!
//! A [`DocumentChunk`] is the atomic retrievable unit: a piece of ingested
//! text with a content-derived identifier, its dense embedding, and a
//! schemaless metadata record. A [`RetrievedDocument`] is the per-request
//! view of a chunk augmented with retrieval and attribution scores.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the source file path.
pub const META_SOURCE: &str = "source";
/// Metadata key holding the dataset name.
pub const META_DATASET: &str = "dataset";
/// Metadata key holding the dense retrieval distance.
pub const META_DISTANCE: &str = "distance";

/// Computes the stable identifier for a piece of chunk text.
///
/// The id is a pure function of the text: two chunks with identical
/// content collapse to one store row.
///
/// # Examples
///
/// ```
/// use ragserve::core::content_id;
///
/// assert_eq!(content_id("hello world"), content_id("hello world"));
/// assert_eq!(content_id("hello world").len(), 32);
/// ```
#[must_use]
pub fn content_id(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// The atomic retrievable unit persisted in the vector store.
///
/// Chunks are created by the ingestor, never mutated, and deleted only
/// by source-path batch delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Content hash of the chunk text (lowercase hex).
    pub id: String,

    /// Chunk text.
    pub content: String,

    /// Dense embedding, dimension fixed at store creation.
    pub embedding: Vec<f32>,

    /// Schemaless metadata; carries at least `source` and `dataset`.
    pub metadata: Map<String, Value>,
}

impl DocumentChunk {
    /// Creates a chunk from text, deriving the id from the content.
    #[must_use]
    pub fn new(content: String, source: &str, dataset: &str, embedding: Vec<f32>) -> Self {
        let id = content_id(&content);
        let mut metadata = Map::new();
        metadata.insert(META_SOURCE.to_string(), Value::String(source.to_string()));
        metadata.insert(META_DATASET.to_string(), Value::String(dataset.to_string()));
        Self {
            id,
            content,
            embedding,
            metadata,
        }
    }

    /// Returns the source path from the metadata record.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).and_then(Value::as_str)
    }

    /// Returns the dataset from the metadata record.
    #[must_use]
    pub fn dataset(&self) -> Option<&str> {
        self.metadata.get(META_DATASET).and_then(Value::as_str)
    }
}

/// A chunk as returned from retrieval, carrying per-request scores.
///
/// `metadata.distance` holds the dense distance (smaller is closer);
/// `score` holds the fused retrieval score after hybrid search, the
/// rerank score after reranking. `provenance` is attached only when
/// answer attribution ran for the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Chunk identifier.
    pub id: String,

    /// Chunk text.
    pub content: String,

    /// Schemaless metadata, including `source`, `dataset`, `distance`.
    pub metadata: Map<String, Value>,

    /// Current relevance score for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Per-document contribution score for the generated answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<f64>,
}

impl RetrievedDocument {
    /// Returns the source path from the metadata record.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).and_then(Value::as_str)
    }

    /// Returns the dataset from the metadata record.
    #[must_use]
    pub fn dataset(&self) -> Option<&str> {
        self.metadata.get(META_DATASET).and_then(Value::as_str)
    }

    /// Returns the dense retrieval distance, when present.
    #[must_use]
    pub fn distance(&self) -> Option<f64> {
        self.metadata.get(META_DISTANCE).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_is_md5_hex() {
        // Known digest for "hello world"
        assert_eq!(content_id("hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_content_id_pure_function() {
        assert_eq!(content_id("same text"), content_id("same text"));
        assert_ne!(content_id("one"), content_id("two"));
    }

    #[test]
    fn test_chunk_new_sets_metadata() {
        let chunk = DocumentChunk::new(
            "some content".to_string(),
            "data/docs/a.txt",
            "docs",
            vec![0.0; 4],
        );
        assert_eq!(chunk.id, content_id("some content"));
        assert_eq!(chunk.source(), Some("data/docs/a.txt"));
        assert_eq!(chunk.dataset(), Some("docs"));
    }

    #[test]
    fn test_retrieved_document_accessors() {
        let mut metadata = Map::new();
        metadata.insert(META_SOURCE.to_string(), Value::String("a.txt".to_string()));
        metadata.insert(META_DATASET.to_string(), Value::String("ds".to_string()));
        metadata.insert(META_DISTANCE.to_string(), Value::from(0.25));

        let doc = RetrievedDocument {
            id: "abc".to_string(),
            content: "text".to_string(),
            metadata,
            score: Some(0.9),
            provenance: None,
        };
        assert_eq!(doc.source(), Some("a.txt"));
        assert_eq!(doc.dataset(), Some("ds"));
        assert_eq!(doc.distance(), Some(0.25));
    }

    #[test]
    fn test_retrieved_document_serialization_omits_absent_scores() {
        let doc = RetrievedDocument {
            id: "abc".to_string(),
            content: "text".to_string(),
            metadata: Map::new(),
            score: None,
            provenance: None,
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("score"));
        assert!(!json.contains("provenance"));
    }
}
