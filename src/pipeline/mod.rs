//! The per-request query pipeline.
//!
//! [`Engine`] bundles everything a request needs (settings snapshot,
//! gateway, embedder, splitter, reranker); [`orchestrator::Pipeline`]
//! drives the staged workflow over it. The engine is rebuilt on config
//! reload and swapped atomically, so a request always sees one consistent
//! snapshot.

pub mod event;
pub mod orchestrator;

pub use event::{ChatOutcome, PipelineEvent};
pub use orchestrator::{ChatParams, Pipeline};

use std::sync::Arc;

use crate::chunking::{TextSplitter, create_splitter};
use crate::config::{ProvenanceMethod, Settings};
use crate::embedding::{Embedder, create_embedder};
use crate::error::{ConfigError, Result};
use crate::llm::LlmGateway;
use crate::rerank::{Reranker, create_reranker};

/// Everything a request needs, built once from a configuration snapshot.
#[derive(Clone)]
pub struct Engine {
    /// The configuration snapshot this engine was built from.
    pub settings: Settings,
    /// Gateway over the selected chat backend.
    pub gateway: LlmGateway,
    /// Dense embedder shared by retrieval, ingestion, and attribution.
    pub embedder: Arc<dyn Embedder>,
    /// Configured text splitter for ingestion.
    pub splitter: Arc<dyn TextSplitter>,
    /// Cross-encoder, present when reranking or rerank-provenance is on.
    pub reranker: Option<Arc<dyn Reranker>>,
    /// Tokenizer for the summarization threshold, when enabled.
    summarization_bpe: Option<Arc<tiktoken_rs::CoreBPE>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.gateway.backend())
            .field("splitter", &self.splitter.name())
            .field("rerank", &self.reranker.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Builds an engine from a configuration snapshot, creating every
    /// component from its configured implementation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no backend is selected or a
    /// component fails to initialize.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let gateway = LlmGateway::new(&settings)?;
        let embedder = create_embedder(&settings)?;
        let splitter = create_splitter(&settings, Arc::clone(&embedder))?;

        let needs_reranker =
            settings.rerank() || settings.provenance_method() == ProvenanceMethod::Rerank;
        let reranker = if needs_reranker {
            Some(create_reranker()?)
        } else {
            None
        };

        Self::new(settings, gateway, embedder, splitter, reranker)
    }

    /// Builds an engine over explicit components. Lets tests swap in a
    /// scripted backend and deterministic embedder/reranker.
    ///
    /// # Errors
    ///
    /// Returns an error when the summarization encoder cannot be loaded.
    pub fn new(
        settings: Settings,
        gateway: LlmGateway,
        embedder: Arc<dyn Embedder>,
        splitter: Arc<dyn TextSplitter>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Result<Self> {
        let summarization_bpe = if settings.use_summarization() {
            let encoder = settings.summarization_encoder().to_string();
            let bpe = tiktoken_rs::get_bpe_from_model(&encoder)
                .or_else(|_| tiktoken_rs::cl100k_base())
                .map_err(|e| ConfigError::InvalidValue {
                    key: "summarization_encoder".to_string(),
                    value: format!("{encoder}: {e}"),
                })?;
            Some(Arc::new(bpe))
        } else {
            None
        };

        Ok(Self {
            settings,
            gateway,
            embedder,
            splitter,
            reranker,
            summarization_bpe,
        })
    }

    /// Counts tokens in `text` with the summarization encoder, falling
    /// back to a characters/4 estimate when no encoder is loaded.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        self.summarization_bpe.as_ref().map_or_else(
            || text.len().div_ceil(4),
            |bpe| bpe.encode_ordinary(text).len(),
        )
    }
}

/// Renders a `{name}` placeholder template.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}
