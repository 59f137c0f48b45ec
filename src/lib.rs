//! # ragserve
//!
//! Retrieval-augmented generation service.
//!
//! ragserve answers questions over an ingested document corpus: it runs a
//! staged query pipeline (summarization, refetch decision, HyDE, hybrid
//! retrieval, reranking, a one-shot rewrite loop, re-reading enhancement),
//! synthesizes an answer grounded in the retrieved passages, attributes it
//! back to source documents, and streams pipeline progress and answer
//! tokens to clients over SSE.
//!
//! ## Features
//!
//! - **Hybrid retrieval**: dense embeddings fused with FTS5 BM25 via
//!   reciprocal rank fusion, dataset-scoped, over `SQLite`
//! - **Pluggable backends**: `OpenAI`, Azure, Anthropic, Gemini, Ollama
//!   behind one chat capability
//! - **Ingestion**: recursive data-directory walks with per-extension
//!   conversion, three splitter strategies, content-hash deduplication
//! - **Streaming**: typed pipeline events multiplexed with answer tokens

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod chunking;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod provenance;
pub mod rerank;
pub mod server;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use crate::core::{DocumentChunk, RetrievedDocument, content_id};

// Re-export configuration types
pub use config::{EnvFile, ProvenanceMethod, Settings};

// Re-export store types
pub use store::{RrfConfig, VectorStore, reciprocal_rank_fusion};

// Re-export chunking types
pub use chunking::{TextSplitter, available_strategies, create_splitter};

// Re-export embedding types
#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{DEFAULT_DIMENSIONS, Embedder, FallbackEmbedder, cosine_similarity, create_embedder};

// Re-export rerank types
pub use rerank::{FallbackReranker, Reranker, create_reranker, rerank_documents};

// Re-export LLM gateway types
pub use llm::{ChatClient, ChatMessage, LlmGateway, Role};

// Re-export pipeline types
pub use pipeline::{ChatOutcome, ChatParams, Engine, Pipeline, PipelineEvent};

// Re-export ingestion types
pub use ingest::{DocumentConverter, Ingestor, PlainTextConverter};
