//! OpenAI-compatible providers (OpenAI, Azure OpenAI, vLLM, LiteLLM, ...)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::error::{Error, Result, ServiceFailure};

use super::embedding::EmbeddingProvider;
use super::llm::{CompletionRequest, LlmProvider};

const SYSTEM_PROMPT: &str =
    "You answer questions strictly from the document excerpts supplied by the user.";

fn build_client(config: &RagConfig) -> Result<Client> {
    let api_key = config
        .llm
        .api_key
        .as_deref()
        .ok_or_else(|| Error::Config("missing API key".to_string()))?;

    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).map_err(|_| Error::Config("invalid API key".to_string()))?,
    );
    // Azure OpenAI authenticates with `api-key` instead of a bearer token
    headers.insert(
        "api-key",
        HeaderValue::from_str(api_key.trim())
            .map_err(|_| Error::Config("invalid API key".to_string()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Client::builder()
        .timeout(config.retry.call_timeout())
        .default_headers(headers)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Embeddings client for `/embeddings`
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &RagConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: format!("{}/embeddings", config.llm.base_url.trim_end_matches('/')),
            model: config.embeddings.model.clone(),
            dimensions: config.embeddings.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::embedding(
                    ServiceFailure::from_reqwest(&e),
                    format!("failed to call embeddings endpoint: {}", e),
                )
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::embedding(
                ServiceFailure::from_status(status, &body),
                format!("embeddings request failed ({}): {}", status, body),
            ));
        }

        let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
            Error::embedding(
                ServiceFailure::Other,
                format!("failed to parse embedding response: {}", e),
            )
        })?;
        parsed.data.sort_by_key(|entry| entry.index);

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Chat completions client
pub struct OpenAiLlm {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiLlm {
    pub fn new(config: &RagConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: format!(
                "{}/chat/completions",
                config.llm.base_url.trim_end_matches('/')
            ),
            model: config.llm.generate_model.clone(),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::generation(
                    ServiceFailure::from_reqwest(&e),
                    format!("failed to call chat completions: {}", e),
                )
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::generation(
                ServiceFailure::from_status(status, &text),
                format!("chat completions returned {}: {}", status, text),
            ));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| {
            Error::generation(
                ServiceFailure::Other,
                format!("failed to parse chat response: {}", e),
            )
        })?;

        Ok(parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
