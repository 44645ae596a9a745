//! pdf-rag: question answering over PDF documents
//!
//! Ingestion extracts page text from a PDF, splits it into semantically
//! coherent chunks, embeds each chunk and writes it to a vector index.
//! Queries embed the question, retrieve the nearest chunks and ask a
//! generative model for an answer grounded in them, with page citations.
//!
//! [`pipeline::Pipeline`] wires the stages together; [`server::RagServer`]
//! exposes it over HTTP.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod retry;
pub mod server;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, PipelineError, Result, Stage};
pub use pipeline::{IngestionReport, Pipeline, QueryReport};
pub use types::{
    document::{Chunk, Document, PageRange},
    query::QueryRequest,
    response::{Answer, Citation, QueryResponse, RetrievalResult, ScoredChunk},
};
