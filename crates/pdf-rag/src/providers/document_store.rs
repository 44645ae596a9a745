//! Document store provider trait for storing raw PDF bytes

use async_trait::async_trait;
use crate::error::Result;

/// Trait for blob storage of uploaded documents
///
/// Implementations:
/// - `LocalDocumentStore`: Local filesystem
/// - `MemoryDocumentStore`: In-process map
#[async_trait]
pub trait DocumentStoreProvider: Send + Sync {
    /// Store (or replace) a document
    async fn put(&self, doc_id: &str, data: &[u8]) -> Result<()>;

    /// Retrieve document bytes
    async fn get(&self, doc_id: &str) -> Result<Vec<u8>>;

    /// Remove a document; missing ids are not an error
    async fn delete(&self, doc_id: &str) -> Result<()>;

    /// List all stored document IDs, sorted
    async fn list(&self) -> Result<Vec<String>>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
