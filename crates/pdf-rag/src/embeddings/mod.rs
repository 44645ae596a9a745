//! Text embedding with batching, input limits and retry

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{EmbeddingConfig, OverflowPolicy};
use crate::error::{Error, Result, ServiceFailure, Stage};
use crate::providers::EmbeddingProvider;
use crate::retry::RetryPolicy;
use crate::types::{Chunk, Embedding};

/// Characters per token used for length estimates
pub const CHARS_PER_TOKEN: usize = 4;

/// Rough token count: `ceil(chars / 4)`
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Converts text to vectors through an [`EmbeddingProvider`]
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
    retry: RetryPolicy,
}

impl Embedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        config: EmbeddingConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            config,
            retry,
        }
    }

    /// Model every vector is produced by
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Embedding> {
        let mut embeddings = self.embed_batch(&[text.to_string()], cancel).await?;
        embeddings.pop().ok_or_else(|| {
            Error::embedding(ServiceFailure::Other, "provider returned no vector")
        })
    }

    /// Embed many texts; one embedding per input, in input order
    pub async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>> {
        let prepared = texts
            .iter()
            .map(|t| self.prepare(t))
            .collect::<Result<Vec<_>>>()?;

        let batch_size = self.config.batch_size.max(1);
        let mut embeddings = Vec::with_capacity(prepared.len());

        for (batch_idx, batch) in prepared.chunks(batch_size).enumerate() {
            let provider = &self.provider;
            let vectors = self
                .retry
                .run(Stage::Embedding, cancel, Error::embedding, || {
                    provider.embed_batch(batch)
                })
                .await?;

            self.check_vectors(batch.len(), &vectors)?;
            tracing::debug!(
                provider = self.provider.name(),
                batch = batch_idx,
                texts = batch.len(),
                "Embedded batch"
            );

            embeddings.extend(
                vectors
                    .into_iter()
                    .map(|v| Embedding::new(self.provider.model(), v)),
            );
        }

        Ok(embeddings)
    }

    /// Attach embeddings to chunks that do not have one yet
    pub async fn embed_chunks(
        &self,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>> {
        let pending: Vec<String> = chunks
            .iter()
            .filter(|c| !c.is_embedded())
            .map(|c| c.content.clone())
            .collect();
        let mut embeddings = self.embed_batch(&pending, cancel).await?.into_iter();

        chunks
            .into_iter()
            .map(|chunk| {
                if chunk.is_embedded() {
                    return Ok(chunk);
                }
                embeddings
                    .next()
                    .map(|embedding| chunk.with_embedding(embedding))
                    .ok_or_else(|| Error::internal("embedding count does not match chunks"))
            })
            .collect()
    }

    /// Validate one input against the model's limits
    fn prepare(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::embedding(
                ServiceFailure::InvalidInput,
                "cannot embed empty text",
            ));
        }

        let tokens = estimate_tokens(text);
        if tokens <= self.config.max_input_tokens {
            return Ok(text.to_string());
        }

        match self.config.overflow {
            OverflowPolicy::Reject => Err(Error::embedding(
                ServiceFailure::InvalidInput,
                format!(
                    "text of ~{} tokens exceeds the model limit of {}",
                    tokens, self.config.max_input_tokens
                ),
            )),
            OverflowPolicy::Truncate => {
                let max_chars = self.config.max_input_tokens * CHARS_PER_TOKEN;
                tracing::warn!(
                    tokens,
                    limit = self.config.max_input_tokens,
                    "Truncating embedding input to {} chars",
                    max_chars
                );
                Ok(text.chars().take(max_chars).collect())
            }
        }
    }

    fn check_vectors(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(Error::embedding(
                ServiceFailure::Other,
                format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    expected
                ),
            ));
        }
        let dims = self.provider.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(Error::embedding(
                ServiceFailure::Other,
                format!(
                    "dimension mismatch: model {} should return {} dimensions, got {}",
                    self.provider.model(),
                    dims,
                    bad.len()
                ),
            ));
        }
        Ok(())
    }
}
