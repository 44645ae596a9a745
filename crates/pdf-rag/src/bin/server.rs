//! PDF RAG server binary
//!
//! Run with: cargo run -p pdf-rag --bin pdf-rag-server -- --config pdf-rag.toml

use clap::Parser;
use pdf_rag::{
    config::{BackendProvider, RagConfig},
    providers::OllamaClient,
    server::RagServer,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pdf-rag-server", version, about = "Question answering over PDF documents")]
struct Args {
    /// TOML configuration file (overrides PDF_RAG_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let mut config = RagConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => RagConfig::load()?,
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - Embedding dimensions: {}", config.embeddings.dimensions);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!(
        "  - Chunk size: {}..={} chars",
        config.chunking.min_chars,
        config.chunking.max_chars
    );

    if config.backend == BackendProvider::Ollama {
        tracing::info!("Checking Ollama at {}...", config.llm.base_url);
        let client = OllamaClient::new(&config.llm.base_url, Duration::from_secs(5))?;
        if client.health_check().await {
            tracing::info!("Ollama is running");
        } else {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!(
                "  Start it with `ollama serve` and pull `{}` and `{}`",
                config.embeddings.model,
                config.llm.generate_model
            );
        }
    }

    let server = RagServer::new(config)?;

    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health             - Liveness and index size");
    tracing::info!("  POST /api/documents/:id  - Ingest a PDF (raw body)");
    tracing::info!("  GET  /api/documents      - List stored PDFs");
    tracing::info!("  POST /api/query          - Ask a question");

    server.start().await?;

    Ok(())
}
