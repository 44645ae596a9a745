//! Provider abstractions for embeddings, LLM, vector storage, and document storage
//!
//! Each external collaborator sits behind an async trait so the pipeline can
//! run against Ollama, an OpenAI-compatible service, or in-process fakes.

pub mod document_store;
pub mod embedding;
pub mod llm;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod vector_store;

pub use document_store::DocumentStoreProvider;
pub use embedding::EmbeddingProvider;
pub use llm::{CompletionRequest, LlmProvider};
pub use local::{LocalDocumentStore, MemoryDocumentStore, MemoryVectorStore};
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm, OllamaProvider};
pub use openai::{OpenAiEmbedder, OpenAiLlm};
pub use vector_store::{IndexRecord, UpsertOutcome, VectorSearchResult, VectorStoreProvider};
