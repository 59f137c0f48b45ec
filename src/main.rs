//! Binary entry point for ragserve.
//!
//! Loads the config file, builds the engine and store, runs cold-start
//! ingestion when the store is empty, and serves the HTTP surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ragserve::pipeline::Engine;
use ragserve::server::{AppState, serve};
use ragserve::store::VectorStore;
use ragserve::{Ingestor, Settings};

/// Retrieval-augmented generation service.
#[derive(Debug, Parser)]
#[command(name = "ragserve", version, about)]
struct Cli {
    /// Path of the KEY=VALUE config file.
    #[arg(long, default_value = ".env")]
    config: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,
}

fn init_tracing(settings: &Settings) {
    use tracing_subscriber::EnvFilter;

    let level = settings.logging_level().to_lowercase();
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings =
        Settings::load(&cli.config).context("failed to load configuration file")?;
    init_tracing(&settings);

    tracing::info!(config = %cli.config.display(), "starting ragserve");
    let engine = Arc::new(Engine::from_settings(settings.clone()).context("engine setup failed")?);

    let store = VectorStore::open(settings.vector_store_path(), settings.db_pool_size())
        .context("failed to open vector store")?;
    store
        .setup(engine.embedder.dimensions())
        .context("store setup failed")?;

    // Cold-start ingestion blocks request acceptance until complete
    if !store.has_data().context("store check failed")? {
        tracing::info!(
            data_directory = %settings.data_directory().display(),
            "store is empty, ingesting data directory"
        );
        let ingestor = Ingestor::new(
            &settings,
            store.clone(),
            Arc::clone(&engine.embedder),
            Arc::clone(&engine.splitter),
        );
        let count = tokio::task::spawn_blocking(move || ingestor.load_directory())
            .await
            .context("ingestion task failed")?
            .context("cold-start ingestion failed")?;
        tracing::info!(chunks = count, "cold-start ingestion complete");
    }

    let state = Arc::new(AppState::new(store, engine, cli.config));
    serve(state, &cli.bind).await
}
