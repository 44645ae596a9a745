//! Prompt templates for grounded answers

use crate::types::ScoredChunk;

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// One numbered context block
    pub fn context_block(index: usize, hit: &ScoredChunk) -> String {
        format!(
            "[{}] {}, {}\n\nContent:\n{}\n\n---\n\n",
            index,
            hit.chunk.document_id,
            hit.chunk.page_range,
            hit.chunk.content
        )
    }

    /// Build context from retrieved chunks, numbered in order
    pub fn build_context(hits: &[ScoredChunk]) -> String {
        hits.iter()
            .enumerate()
            .map(|(i, hit)| Self::context_block(i + 1, hit))
            .collect()
    }

    /// Build the full prompt with strict grounding
    pub fn grounded_prompt(question: &str, context: &str) -> String {
        format!(
            r#"You are a document-grounded assistant that ONLY uses information from the provided PDF excerpts.

RULES:
1. ONLY use information that is EXPLICITLY stated in the CONTEXT below
2. If the answer is not in the context, respond with "I cannot find this information in the provided documents."
3. NEVER use external knowledge or make assumptions beyond what is stated
4. Cite the excerpts you used by their number, e.g. [1]

CONTEXT FROM DOCUMENTS:
{context}
QUESTION: {question}

Answer using ONLY the document content above:"#,
            context = context,
            question = question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, PageRange};

    #[test]
    fn test_prompt_numbers_blocks_with_pages() {
        let hits = vec![
            ScoredChunk {
                chunk: Chunk::new("policy.pdf", 0, PageRange::single(1), "Thirty days.".to_string()),
                score: 0.9,
            },
            ScoredChunk {
                chunk: Chunk::new("policy.pdf", 1, PageRange { start: 2, end: 3 }, "Approval.".to_string()),
                score: 0.4,
            },
        ];
        let prompt = PromptBuilder::grounded_prompt("How long?", &PromptBuilder::build_context(&hits));

        assert!(prompt.contains("[1] policy.pdf, page 1"));
        assert!(prompt.contains("[2] policy.pdf, pages 2-3"));
        assert!(prompt.find("Thirty days.") < prompt.find("Approval."));
        assert!(prompt.ends_with("Answer using ONLY the document content above:"));
        assert!(prompt.contains("QUESTION: How long?"));
    }
}
