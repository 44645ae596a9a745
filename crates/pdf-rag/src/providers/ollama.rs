//! Ollama-based providers for embeddings and generation
//!
//! One shared `OllamaClient` talks to `/api/embed` and `/api/generate`;
//! `OllamaEmbedder` and `OllamaLlm` adapt it to the provider traits.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::error::{Error, Result, ServiceFailure};

use super::embedding::EmbeddingProvider;
use super::llm::{CompletionRequest, LlmProvider};

/// Ollama HTTP API client
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Server base URL
    base_url: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Embed a batch of texts with one request
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest { model, input: texts };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::embedding(
                    ServiceFailure::from_reqwest(&e),
                    format!("Embedding request failed: {}", e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(
                ServiceFailure::from_status(status, &body),
                format!("Embedding failed: HTTP {} - {}", status, body),
            ));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            Error::embedding(
                ServiceFailure::Other,
                format!("Failed to parse embedding response: {}", e),
            )
        })?;

        Ok(parsed.embeddings)
    }

    /// Non-streaming generation
    async fn generate(&self, model: &str, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::generation(
                    ServiceFailure::from_reqwest(&e),
                    format!("Generation request failed: {}", e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::generation(
                ServiceFailure::from_status(status, &body),
                format!("Generation failed: HTTP {} - {}", status, body),
            ));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            Error::generation(
                ServiceFailure::Other,
                format!("Failed to parse generation response: {}", e),
            )
        })?;

        Ok(parsed.response)
    }
}

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    dimensions: usize,
    model: String,
}

impl OllamaEmbedder {
    /// Create from an existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, dimensions: usize, model: String) -> Self {
        Self {
            client,
            dimensions,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client.embed(&self.model, texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama LLM provider for answer generation
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaLlm {
    /// Create from an existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.client.generate(&self.model, request).await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Combined Ollama provider that shares a single client for both embeddings and LLM
pub struct OllamaProvider {
    client: Arc<OllamaClient>,
    embedder: OllamaEmbedder,
    llm: OllamaLlm,
}

impl OllamaProvider {
    /// Create a new combined Ollama provider
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = Arc::new(OllamaClient::new(
            &config.llm.base_url,
            config.retry.call_timeout(),
        )?);
        Ok(Self {
            embedder: OllamaEmbedder::from_client(
                Arc::clone(&client),
                config.embeddings.dimensions,
                config.embeddings.model.clone(),
            ),
            llm: OllamaLlm::from_client(Arc::clone(&client), config.llm.generate_model.clone()),
            client,
        })
    }

    /// Check if the server is reachable
    pub async fn health_check(&self) -> bool {
        self.client.health_check().await
    }

    /// Split into separate providers
    pub fn split(self) -> (OllamaEmbedder, OllamaLlm) {
        (self.embedder, self.llm)
    }
}
