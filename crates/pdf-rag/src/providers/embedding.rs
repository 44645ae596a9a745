//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;
use crate::error::Result;

/// Trait for a remote embedding service
///
/// Implementations:
/// - `OllamaEmbedder`: Local Ollama server (nomic-embed-text)
/// - `OpenAiEmbedder`: OpenAI-compatible `/embeddings` endpoint
///
/// Providers perform a single remote call per invocation; retries,
/// batching and input validation live in [`crate::embeddings::Embedder`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per input, in order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            crate::Error::embedding(
                crate::error::ServiceFailure::Other,
                "provider returned no vector",
            )
        })
    }

    /// Embedding dimensions (e.g., 768 for nomic-embed-text)
    fn dimensions(&self) -> usize;

    /// Model name recorded on every vector
    fn model(&self) -> &str;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
