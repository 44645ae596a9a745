//! Vector store provider trait for storing and searching embeddings

use async_trait::async_trait;
use crate::error::Result;
use crate::types::ChunkPayload;

/// One record written to the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    /// Key; an existing record with the same id is overwritten
    pub id: String,
    /// Chunk vector
    pub vector: Vec<f32>,
    /// Chunk metadata
    pub payload: ChunkPayload,
}

/// Per-record result of an upsert call
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub id: String,
    /// None on success, the index's reason otherwise
    pub error: Option<String>,
}

impl UpsertOutcome {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: Some(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Search hit from the vector store
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    /// Record id
    pub id: String,
    /// Stored payload
    pub payload: ChunkPayload,
    /// Similarity score (higher is more similar)
    pub score: f32,
}

/// Trait for vector storage and similarity search
///
/// Implementations:
/// - `MemoryVectorStore`: exact in-process search
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Insert or overwrite records
    ///
    /// `Err` means the whole call failed; per-record rejections are reported
    /// in the returned outcomes.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<Vec<UpsertOutcome>>;

    /// k-nearest-neighbour search, best first
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorSearchResult>>;

    /// Get total number of vectors stored
    async fn len(&self) -> Result<usize>;

    /// Check if store is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Get provider name for logging
    fn name(&self) -> &str;
}
