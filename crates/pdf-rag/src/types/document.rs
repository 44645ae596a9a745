//! Document and chunk types with page tracking for citations

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An uploaded PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Caller-chosen identifier (e.g. the file name)
    pub id: String,
    /// Original filename as uploaded
    pub filename: String,
    /// SHA-256 of the raw bytes, hex encoded
    pub content_hash: String,
    /// Total number of pages, including pages without text
    pub total_pages: u32,
    /// Total number of chunks created
    pub total_chunks: u32,
    /// File size in bytes
    pub file_size: u64,
    /// Ingestion timestamp
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    /// Create a document record for freshly uploaded bytes
    pub fn new(id: impl Into<String>, filename: impl Into<String>, data: &[u8]) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            content_hash: hash_bytes(data),
            total_pages: 0,
            total_chunks: 0,
            file_size: data.len() as u64,
            ingested_at: chrono::Utc::now(),
        }
    }
}

/// Hex-encoded SHA-256
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Inclusive 1-indexed page span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// A range covering one page
    pub fn single(page: u32) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    /// Widen the range to include `page`
    pub fn extend_to(&mut self, page: u32) {
        self.start = self.start.min(page);
        self.end = self.end.max(page);
    }

    /// Whether `page` lies inside the range
    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "page {}", self.start)
        } else {
            write!(f, "pages {}-{}", self.start, self.end)
        }
    }
}

/// A vector produced by a specific embedding model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Model that produced the vector
    pub model: String,
    /// The vector itself
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    /// Whether two embeddings can be compared
    pub fn is_compatible_with(&self, other: &Embedding) -> bool {
        self.model == other.model && self.dimensions() == other.dimensions()
    }
}

/// A contiguous span of document text, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id, unique within the document: `{document_id}#{index:05}`
    pub id: String,
    /// Parent document ID
    pub document_id: String,
    /// Chunk index within document
    pub chunk_index: u32,
    /// Pages the text was taken from
    pub page_range: PageRange,
    /// Text content (trimmed, never empty)
    pub content: String,
    /// Embedding, attached once by the embedder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(
        document_id: impl Into<String>,
        chunk_index: u32,
        page_range: PageRange,
        content: String,
    ) -> Self {
        let document_id = document_id.into();
        Self {
            id: Self::make_id(&document_id, chunk_index),
            document_id,
            chunk_index,
            page_range,
            content,
            embedding: None,
        }
    }

    /// Deterministic chunk id
    pub fn make_id(document_id: &str, chunk_index: u32) -> String {
        format!("{}#{:05}", document_id, chunk_index)
    }

    /// Attach an embedding; chunks are immutable once embedded
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        debug_assert!(self.embedding.is_none(), "chunk {} embedded twice", self.id);
        self.embedding = Some(embedding);
        self
    }

    /// Whether an embedding is attached
    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// Payload stored next to the vector in the index
    pub fn to_payload(&self) -> ChunkPayload {
        ChunkPayload {
            chunk_id: self.id.clone(),
            document_id: self.document_id.clone(),
            chunk_index: self.chunk_index,
            page_start: self.page_range.start,
            page_end: self.page_range.end,
            content: self.content.clone(),
            model: self
                .embedding
                .as_ref()
                .map(|e| e.model.clone())
                .unwrap_or_default(),
        }
    }

    /// Rebuild a chunk (without its vector) from an index payload
    pub fn from_payload(payload: &ChunkPayload) -> Self {
        Self {
            id: payload.chunk_id.clone(),
            document_id: payload.document_id.clone(),
            chunk_index: payload.chunk_index,
            page_range: PageRange {
                start: payload.page_start,
                end: payload.page_end,
            },
            content: payload.content.clone(),
            embedding: None,
        }
    }
}

/// Metadata written to the vector index with each chunk vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub page_start: u32,
    pub page_end: u32,
    pub content: String,
    /// Embedding model the vector came from
    pub model: String,
}
