//! Retrieval and answer types

use serde::{Deserialize, Serialize};

use super::document::Chunk;

/// A retrieved chunk with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Similarity under the index metric (higher is more similar)
    pub score: f32,
}

/// Top-k hits for one query, ordered by descending score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Build a result, sorting by descending score (stable, so ties keep
    /// the order the index returned them in) and keeping at most `k`
    pub fn new(mut hits: Vec<ScoredChunk>, k: usize) -> Self {
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Self { hits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<ScoredChunk> {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Highest-scoring hit
    pub fn top(&self) -> Option<&ScoredChunk> {
        self.hits.first()
    }
}

/// Fallback text when nothing relevant was retrieved
pub const NOT_FOUND_ANSWER: &str = "No relevant information found in the PDF documents.";

/// Fallback text when the model returned nothing
pub const EMPTY_COMPLETION_ANSWER: &str = "No response generated. Please refine your query.";

/// Generated answer plus the chunks it was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Answer text
    pub text: String,
    /// Chunks included in the prompt after truncation
    pub context: Vec<ScoredChunk>,
    /// False when a fallback answer was produced without model output
    pub grounded: bool,
}

impl Answer {
    /// Answer for an empty retrieval result
    pub fn not_found() -> Self {
        Self {
            text: NOT_FOUND_ANSWER.to_string(),
            context: Vec::new(),
            grounded: false,
        }
    }

    /// Ids of the chunks used as context
    pub fn cited_chunk_ids(&self) -> Vec<&str> {
        self.context.iter().map(|c| c.chunk.id.as_str()).collect()
    }
}

/// Citation returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub page_start: u32,
    pub page_end: u32,
    pub score: f32,
}

impl Citation {
    pub fn from_scored(scored: &ScoredChunk) -> Self {
        Self {
            chunk_id: scored.chunk.id.clone(),
            document_id: scored.chunk.document_id.clone(),
            page_start: scored.chunk.page_range.start,
            page_end: scored.chunk.page_range.end,
            score: scored.score,
        }
    }
}

/// Response body of the query endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated answer
    pub answer: String,
    /// Chunks the answer was grounded on
    pub citations: Vec<Citation>,
    /// Whether the answer came from the model
    pub grounded: bool,
    /// Number of chunks retrieved before context truncation
    pub chunks_retrieved: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl QueryResponse {
    pub fn from_answer(answer: &Answer, chunks_retrieved: usize, processing_time_ms: u64) -> Self {
        Self {
            answer: answer.text.clone(),
            citations: answer.context.iter().map(Citation::from_scored).collect(),
            grounded: answer.grounded,
            chunks_retrieved,
            processing_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageRange;

    fn hit(id: u32, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new("d.pdf", id, PageRange::single(1), format!("chunk {}", id)),
            score,
        }
    }

    #[test]
    fn test_result_is_sorted_and_truncated() {
        let result = RetrievalResult::new(vec![hit(0, 0.2), hit(1, 0.9), hit(2, 0.5)], 2);
        let scores: Vec<f32> = result.hits().iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![0.9, 0.5]);
    }

    #[test]
    fn test_ties_keep_index_order() {
        let result = RetrievalResult::new(vec![hit(0, 0.5), hit(1, 0.5), hit(2, 0.7)], 3);
        let ids: Vec<u32> = result.hits().iter().map(|h| h.chunk.chunk_index).collect();
        assert_eq!(ids, vec![2, 0, 1]);
    }

    #[test]
    fn test_not_found_answer_has_no_context() {
        let answer = Answer::not_found();
        assert!(!answer.grounded);
        assert!(answer.cited_chunk_ids().is_empty());
    }
}
