//! Answer generation from retrieved chunks

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;
use crate::embeddings::{estimate_tokens, CHARS_PER_TOKEN};
use crate::error::{Error, Result, ServiceFailure, Stage};
use crate::providers::{CompletionRequest, LlmProvider};
use crate::retry::RetryPolicy;
use crate::types::response::EMPTY_COMPLETION_ANSWER;
use crate::types::{Answer, RetrievalResult, ScoredChunk};

use super::prompt::PromptBuilder;

/// Builds grounded prompts and calls the generative model
#[derive(Clone)]
pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: LlmConfig, retry: RetryPolicy) -> Self {
        Self { llm, config, retry }
    }

    /// Answer `question` from the retrieved chunks
    pub async fn generate(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        if retrieval.is_empty() {
            tracing::info!("No chunks retrieved, returning fallback answer");
            return Ok(Answer::not_found());
        }

        let context = self.select_context(question, retrieval.hits())?;
        let prompt = PromptBuilder::grounded_prompt(question, &PromptBuilder::build_context(&context));
        let request = CompletionRequest {
            prompt,
            temperature: self.config.temperature,
            max_tokens: self.config.max_answer_tokens,
        };

        tracing::debug!(
            llm = self.llm.name(),
            model = self.llm.model(),
            chunks = context.len(),
            prompt_tokens = estimate_tokens(&request.prompt),
            "Generating answer"
        );

        let llm = &self.llm;
        let request = &request;
        let text = self
            .retry
            .run(Stage::Generating, cancel, Error::generation, || llm.complete(request))
            .await?;

        let text = text.trim();
        if text.is_empty() {
            tracing::warn!("Model returned an empty completion");
            return Ok(Answer {
                text: EMPTY_COMPLETION_ANSWER.to_string(),
                context,
                grounded: false,
            });
        }

        Ok(Answer {
            text: text.to_string(),
            context,
            grounded: true,
        })
    }

    /// Chunks that fit the context window, lowest-similarity dropped first
    pub fn select_context(&self, question: &str, hits: &[ScoredChunk]) -> Result<Vec<ScoredChunk>> {
        let overhead = estimate_tokens(&PromptBuilder::grounded_prompt(question, ""));
        let budget = self
            .config
            .context_window_tokens
            .saturating_sub(self.config.max_answer_tokens)
            .saturating_sub(overhead);

        if budget == 0 {
            return Err(Error::generation(
                ServiceFailure::InvalidInput,
                "question leaves no room for context in the model window",
            ));
        }

        let mut selected: Vec<ScoredChunk> = hits.to_vec();
        let mut used: usize = selected
            .iter()
            .enumerate()
            .map(|(i, hit)| estimate_tokens(&PromptBuilder::context_block(i + 1, hit)))
            .sum();

        while used > budget && selected.len() > 1 {
            // last minimum, so among equal scores the later chunk goes first
            let drop_at = selected
                .iter()
                .enumerate()
                .rev()
                .min_by(|(_, a), (_, b)| a.score.total_cmp(&b.score))
                .map(|(i, _)| i)
                .unwrap_or(selected.len() - 1);
            let dropped = selected.remove(drop_at);
            tracing::debug!(chunk_id = %dropped.chunk.id, score = dropped.score, "Dropping chunk from context");
            used = selected
                .iter()
                .enumerate()
                .map(|(i, hit)| estimate_tokens(&PromptBuilder::context_block(i + 1, hit)))
                .sum();
        }

        if used > budget {
            if let Some(top) = selected.first_mut() {
                let frame = estimate_tokens(&PromptBuilder::context_block(
                    1,
                    &ScoredChunk {
                        chunk: crate::types::Chunk {
                            content: String::new(),
                            ..top.chunk.clone()
                        },
                        score: top.score,
                    },
                ));
                if frame >= budget {
                    return Err(Error::generation(
                        ServiceFailure::InvalidInput,
                        format!(
                            "model window leaves no room for the text of chunk {}",
                            top.chunk.id
                        ),
                    ));
                }
                let max_chars = (budget - frame) * CHARS_PER_TOKEN;
                tracing::warn!(
                    chunk_id = %top.chunk.id,
                    "Truncating top chunk to {} chars to fit the context window",
                    max_chars
                );
                top.chunk.content = top.chunk.content.chars().take(max_chars).collect();
            }
        }

        Ok(selected)
    }
}
