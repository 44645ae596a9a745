//! Core types for the pipeline

pub mod document;
pub mod query;
pub mod response;

pub use document::{hash_bytes, Chunk, ChunkPayload, Document, Embedding, PageRange};
pub use query::{Query, QueryRequest};
pub use response::{Answer, Citation, QueryResponse, RetrievalResult, ScoredChunk};
