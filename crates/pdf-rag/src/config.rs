//! Configuration for the PDF RAG pipeline
//!
//! Built once at startup (TOML file plus environment overrides), validated,
//! and then shared read-only with every component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Which remote services back the embedder and generator
    pub backend: BackendProvider,
    /// Server configuration
    pub server: ServerConfig,
    /// PDF extraction configuration
    pub extraction: ExtractionConfig,
    /// Semantic chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Vector index configuration
    pub index: IndexConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Generation (LLM) configuration
    pub llm: LlmConfig,
    /// Retry/timeout policy shared by all remote calls
    pub retry: RetryConfig,
    /// Blob storage configuration
    pub storage: StorageConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load from `PDF_RAG_CONFIG` (if set), apply environment overrides and validate
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("PDF_RAG_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PDF_RAG_BACKEND") {
            self.backend = match v.trim().to_lowercase().as_str() {
                "ollama" => BackendProvider::Ollama,
                "openai" => BackendProvider::OpenAi,
                other => {
                    return Err(Error::Config(format!("Unknown backend '{}'", other)));
                }
            };
        }
        if let Some(v) = get("PDF_RAG_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("PDF_RAG_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("PDF_RAG_EMBED_MODEL") {
            self.embeddings.model = v;
        }
        if let Some(v) = get("PDF_RAG_EMBED_DIMENSIONS") {
            self.embeddings.dimensions = parse_env("PDF_RAG_EMBED_DIMENSIONS", &v)?;
        }
        if let Some(v) = get("PDF_RAG_GENERATE_MODEL") {
            self.llm.generate_model = v;
        }
        if let Some(v) = get("PDF_RAG_TEMPERATURE") {
            self.llm.temperature = parse_env("PDF_RAG_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("PDF_RAG_TOP_K") {
            self.retrieval.top_k = parse_env("PDF_RAG_TOP_K", &v)?;
        }
        if let Some(v) = get("PDF_RAG_MIN_CHUNK_CHARS") {
            self.chunking.min_chars = parse_env("PDF_RAG_MIN_CHUNK_CHARS", &v)?;
        }
        if let Some(v) = get("PDF_RAG_MAX_CHUNK_CHARS") {
            self.chunking.max_chars = parse_env("PDF_RAG_MAX_CHUNK_CHARS", &v)?;
        }
        if let Some(v) = get("PDF_RAG_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("PDF_RAG_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("PDF_RAG_CALL_TIMEOUT_SECS") {
            self.retry.call_timeout_secs = parse_env("PDF_RAG_CALL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("PDF_RAG_STORAGE_DIR") {
            self.storage.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = get("PDF_RAG_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PDF_RAG_PORT") {
            self.server.port = parse_env("PDF_RAG_PORT", &v)?;
        }

        Ok(())
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.max_chars == 0 {
            return Err(Error::Config("chunking.max_chars must be > 0".to_string()));
        }
        if c.min_chars > c.max_chars {
            return Err(Error::Config(format!(
                "chunking.min_chars ({}) exceeds chunking.max_chars ({})",
                c.min_chars, c.max_chars
            )));
        }
        if let Breakpoint::Percentile { percentile } = c.breakpoint {
            if !(0.0..=100.0).contains(&percentile) {
                return Err(Error::Config(format!(
                    "chunking percentile must be within 0..=100, got {}",
                    percentile
                )));
            }
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be > 0".to_string()));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::Config("embeddings.batch_size must be > 0".to_string()));
        }
        if self.index.upsert_batch_size == 0 {
            return Err(Error::Config("index.upsert_batch_size must be > 0".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be > 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be >= 1".to_string()));
        }
        if self.llm.max_answer_tokens >= self.llm.context_window_tokens {
            return Err(Error::Config(
                "llm.max_answer_tokens must be smaller than llm.context_window_tokens".to_string(),
            ));
        }
        if self.backend == BackendProvider::OpenAi && self.llm.api_key.is_none() {
            return Err(Error::Config(
                "OpenAI backend selected but no API key configured (PDF_RAG_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has an invalid value: '{}'", key, value)))
}

/// Remote service family
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Local Ollama server for both embeddings and generation
    #[default]
    Ollama,
    /// OpenAI-compatible HTTP API (OpenAI, Azure OpenAI, vLLM, ...)
    #[serde(rename = "openai")]
    OpenAi,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// PDF extraction configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Password tried on encrypted PDFs (empty opens owner-password-only files)
    pub password: String,
}

/// How adjacent sentence groups are compared
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimilaritySignal {
    /// Term-frequency cosine, computed locally
    #[default]
    Lexical,
    /// Cosine of sentence-group embeddings from the embedding service
    Embedding,
}

/// Adaptive threshold over a document's adjacent-group similarities
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Breakpoint {
    /// Split where similarity < mean - k * stddev
    StdDev { k: f32 },
    /// Split where similarity falls in the lowest (100 - percentile)%
    Percentile { percentile: f32 },
}

impl Default for Breakpoint {
    fn default() -> Self {
        Self::StdDev { k: 1.0 }
    }
}

/// Semantic chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Minimum chunk size in characters (last chunk may be shorter)
    pub min_chars: usize,
    /// Maximum chunk size in characters
    pub max_chars: usize,
    /// Sentences of context on each side when comparing groups
    pub buffer_size: usize,
    /// Adaptive boundary threshold
    pub breakpoint: Breakpoint,
    /// Similarities below this always count as a boundary candidate
    pub similarity_floor: f32,
    /// Similarity signal
    pub signal: SimilaritySignal,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chars: 40,
            max_chars: 1500,
            buffer_size: 1,
            breakpoint: Breakpoint::default(),
            similarity_floor: 0.05,
            signal: SimilaritySignal::Lexical,
        }
    }
}

/// What to do with texts over the embedding model's token limit
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Cut at the limit and log a warning
    #[default]
    Truncate,
    /// Fail the call
    Reject,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model name
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Texts per remote call
    pub batch_size: usize,
    /// Token limit of the model (tokens estimated as chars / 4)
    pub max_input_tokens: usize,
    /// Over-limit handling
    pub overflow: OverflowPolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 16,
            max_input_tokens: 2048,
            overflow: OverflowPolicy::Truncate,
        }
    }
}

/// Similarity metric configured on the vector index
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity
    #[default]
    Cosine,
    /// Raw dot product
    InnerProduct,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Records per upsert call
    pub upsert_batch_size: usize,
    /// Similarity metric
    pub metric: DistanceMetric,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            upsert_batch_size: 64,
            metric: DistanceMetric::Cosine,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of chunks to retrieve
    pub top_k: usize,
    /// Drop hits scoring below this (None keeps everything)
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: None,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Service base URL (Ollama or OpenAI-compatible)
    pub base_url: String,
    /// API key for OpenAI-compatible services
    pub api_key: Option<String>,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_answer_tokens: usize,
    /// Model context window (tokens)
    pub context_window_tokens: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            generate_model: "llama3.2:3b".to_string(),
            temperature: 0.0,
            max_answer_tokens: 500,
            context_window_tokens: 4096,
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry (ms)
    pub initial_backoff_ms: u64,
    /// Delay cap (ms)
    pub max_backoff_ms: u64,
    /// Backoff growth factor
    pub multiplier: f64,
    /// Timeout for a single remote call (seconds)
    pub call_timeout_secs: u64,
}

impl RetryConfig {
    /// Per-call timeout
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            multiplier: 2.0,
            call_timeout_secs: 60,
        }
    }
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for uploaded PDFs
    pub storage_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let storage_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pdf-rag")
            .join("documents");
        Self { storage_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        RagConfig::default().validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PDF_RAG_TOP_K", "3"),
            ("PDF_RAG_EMBED_MODEL", "text-embedding-3-small"),
            ("PDF_RAG_TEMPERATURE", "0.2"),
            ("PDF_RAG_MAX_ATTEMPTS", "6"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embeddings.model, "text-embedding-3-small");
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.retry.max_attempts, 6);
    }

    #[test]
    fn test_invalid_env_value_is_config_error() {
        let mut config = RagConfig::default();
        let err = config
            .apply_env(|k| (k == "PDF_RAG_TOP_K").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_inverted_chunk_band() {
        let mut config = RagConfig::default();
        config.chunking.min_chars = 2000;
        config.chunking.max_chars = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_openai_backend_requires_key() {
        let mut config = RagConfig::default();
        config.backend = BackendProvider::OpenAi;
        assert!(config.validate().is_err());
        config.llm.api_key = Some("sk-test".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config: RagConfig = toml::from_str(
            r#"
            backend = "openai"

            [chunking]
            max_chars = 800
            breakpoint = { kind = "percentile", percentile = 95.0 }

            [retrieval]
            top_k = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendProvider::OpenAi);
        assert_eq!(config.chunking.max_chars, 800);
        assert_eq!(config.chunking.min_chars, 40);
        assert_eq!(config.chunking.breakpoint, Breakpoint::Percentile { percentile: 95.0 });
        assert_eq!(config.retrieval.top_k, 3);
    }
}
