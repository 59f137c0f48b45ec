//! HTTP surface for the service.
//!
//! Builds the axum router over a shared [`AppState`]: the store (always
//! shared), the current engine snapshot behind an `RwLock` (replaced
//! atomically on config reload), and the config file path. Serving waits
//! for cold-start ingestion to finish before accepting requests and shuts
//! down gracefully on ctrl-c.

pub mod handlers;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::Router;
use axum::routing::{get, post};

use crate::chunking::create_splitter;
use crate::config::{ProvenanceMethod, Settings};
use crate::error::Result;
use crate::ingest::Ingestor;
use crate::llm::LlmGateway;
use crate::pipeline::Engine;
use crate::rerank::create_reranker;
use crate::store::VectorStore;

/// Shared state behind every handler.
pub struct AppState {
    /// The vector store with its bounded connection pool.
    pub store: VectorStore,
    /// Current engine snapshot; requests clone the `Arc` once at entry.
    engine: RwLock<Arc<Engine>>,
    /// Path of the config file served by the config endpoints.
    pub env_path: PathBuf,
}

impl AppState {
    /// Creates the state over an initial engine.
    #[must_use]
    pub fn new(store: VectorStore, engine: Arc<Engine>, env_path: PathBuf) -> Self {
        Self {
            store,
            engine: RwLock::new(engine),
            env_path,
        }
    }

    /// Returns the current engine snapshot.
    #[must_use]
    pub fn engine(&self) -> Arc<Engine> {
        self.engine
            .read()
            .map_or_else(|e| Arc::clone(&e.into_inner()), |g| Arc::clone(&g))
    }

    /// Atomically replaces the engine snapshot. In-flight requests keep
    /// the snapshot they started with.
    pub fn replace_engine(&self, engine: Arc<Engine>) {
        match self.engine.write() {
            Ok(mut guard) => *guard = engine,
            Err(mut poisoned) => **poisoned.get_mut() = engine,
        }
    }

    /// Builds an ingestor over the current engine snapshot.
    #[must_use]
    pub fn ingestor(&self) -> Ingestor {
        let engine = self.engine();
        Ingestor::new(
            &engine.settings,
            self.store.clone(),
            Arc::clone(&engine.embedder),
            Arc::clone(&engine.splitter),
        )
    }

    /// Rebuilds the engine for a fresh settings snapshot.
    ///
    /// With `reinitialize` the heavy components (embedder, reranker) are
    /// reloaded too; without it they are carried over and only the
    /// gateway, splitter, and snapshot are rebuilt.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the new snapshot is invalid.
    pub fn rebuild_engine(&self, settings: Settings, reinitialize: bool) -> Result<Arc<Engine>> {
        if reinitialize {
            return Ok(Arc::new(Engine::from_settings(settings)?));
        }

        let current = self.engine();
        let gateway = LlmGateway::new(&settings)?;
        let embedder = Arc::clone(&current.embedder);
        let splitter = create_splitter(&settings, Arc::clone(&embedder))?;

        let needs_reranker =
            settings.rerank() || settings.provenance_method() == ProvenanceMethod::Rerank;
        let reranker = if needs_reranker {
            match &current.reranker {
                Some(existing) => Some(Arc::clone(existing)),
                None => Some(create_reranker()?),
            }
        } else {
            None
        };

        Ok(Arc::new(Engine::new(
            settings, gateway, embedder, splitter, reranker,
        )?))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("env_path", &self.env_path)
            .finish_non_exhaustive()
    }
}

/// Builds the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/create_title", post(handlers::create_title))
        .route("/chat", post(handlers::chat))
        .route("/chat_stream", post(handlers::chat_stream))
        .route("/get_documents", get(handlers::get_documents))
        .route("/get_document", post(handlers::get_document))
        .route("/delete", post(handlers::delete_document))
        .route("/add_document", post(handlers::add_document))
        .route("/get_datasets", get(handlers::get_datasets))
        .route(
            "/config",
            get(handlers::get_config).put(handlers::update_config),
        )
        .with_state(state)
}

/// Serves the router until ctrl-c.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
