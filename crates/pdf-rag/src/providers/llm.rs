//! LLM provider trait for generating answers

use async_trait::async_trait;
use crate::error::Result;

/// A single prompt-in, text-out request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully assembled prompt
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: usize,
}

/// Trait for a generative model
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (`/api/generate`)
/// - `OpenAiLlm`: OpenAI-compatible chat completions
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate text for a prompt (one remote call, no retry)
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
