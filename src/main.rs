use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

use pdf_rag_chat::config::{Config, StoreBackend};
use pdf_rag_chat::database::QdrantStore;
use pdf_rag_chat::ingest::Ingestor;
use pdf_rag_chat::openai::OpenAiClient;
use pdf_rag_chat::rag::RagEngine;
use pdf_rag_chat::server::{router, AppState};
use pdf_rag_chat::store::{MemoryStore, VectorStore};

/// Chat with an uploaded PDF using OpenAI models and a vector index
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration from environment
    let config = Config::from_env().context("Invalid configuration")?;

    let openai = Arc::new(OpenAiClient::new(config.openai.clone())?);
    let store: Arc<dyn VectorStore> = match config.index.backend {
        StoreBackend::Qdrant => Arc::new(
            QdrantStore::new(config.index.clone()).context("Failed to initialize Qdrant client")?,
        ),
        StoreBackend::Memory => Arc::new(MemoryStore::new(config.index.dimension)),
    };

    store
        .ensure_index()
        .await
        .context("Failed to prepare vector index")?;

    let ingestor = Ingestor::new(openai.clone(), store.clone());
    let engine = RagEngine::new(openai.clone(), openai, store);
    let app = router(AppState::new(ingestor, engine), &config.http)?;

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
