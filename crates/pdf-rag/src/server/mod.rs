//! HTTP server for the PDF RAG pipeline

pub mod routes;
pub mod state;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use state::AppState;

/// PDF RAG HTTP server
pub struct RagServer {
    config: RagConfig,
    state: AppState,
}

impl RagServer {
    /// Create a server with providers built from configuration
    pub fn new(config: RagConfig) -> Result<Self> {
        let pipeline = Pipeline::from_config(config)?;
        Ok(Self::with_pipeline(pipeline))
    }

    /// Create a server around an already wired pipeline
    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        Self {
            config: pipeline.config().clone(),
            state: AppState::new(pipeline),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_check))
            .nest("/api", routes::api_routes(self.config.server.max_upload_size))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.server.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router.layer(cors)
        } else {
            router
        }
    }

    /// Bind and serve until ctrl-c
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("Starting PDF RAG server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind {}: {}", addr, e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        tracing::info!("Server stopped");
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    indexed_chunks: usize,
    uptime_secs: u64,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let indexed_chunks = state.pipeline().indexed_chunks().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        indexed_chunks,
        uptime_secs: state.uptime_secs(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
