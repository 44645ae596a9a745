//! Local provider implementations: in-process vector index and filesystem blob store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::config::DistanceMetric;
use crate::error::{Error, Result};
use crate::retrieval::similarity;

use super::document_store::DocumentStoreProvider;
use super::vector_store::{IndexRecord, UpsertOutcome, VectorSearchResult, VectorStoreProvider};

#[derive(Default)]
struct IndexState {
    records: HashMap<String, IndexRecord>,
    /// First-insertion order; overwrites keep their original slot
    order: Vec<String>,
    dimensions: Option<usize>,
}

/// Exact nearest-neighbour index held in memory
///
/// The first record written fixes the index dimensionality; later records
/// and queries with a different length are rejected.
pub struct MemoryVectorStore {
    metric: DistanceMetric,
    state: RwLock<IndexState>,
}

impl MemoryVectorStore {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Stored record by id
    pub fn get(&self, id: &str) -> Option<IndexRecord> {
        self.state.read().records.get(id).cloned()
    }

    /// All stored records in insertion order
    pub fn records(&self) -> Vec<IndexRecord> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect()
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => similarity::cosine(a, b),
            DistanceMetric::InnerProduct => similarity::dot(a, b),
        }
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new(DistanceMetric::Cosine)
    }
}

#[async_trait]
impl VectorStoreProvider for MemoryVectorStore {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<Vec<UpsertOutcome>> {
        let mut state = self.state.write();
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            if record.vector.is_empty() {
                outcomes.push(UpsertOutcome::failed(&record.id, "empty vector"));
                continue;
            }
            let expected = *state.dimensions.get_or_insert(record.vector.len());
            if record.vector.len() != expected {
                outcomes.push(UpsertOutcome::failed(
                    &record.id,
                    format!(
                        "dimension mismatch: index has {}, record has {}",
                        expected,
                        record.vector.len()
                    ),
                ));
                continue;
            }

            if state
                .records
                .insert(record.id.clone(), record.clone())
                .is_none()
            {
                state.order.push(record.id.clone());
            }
            outcomes.push(UpsertOutcome::ok(&record.id));
        }

        Ok(outcomes)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorSearchResult>> {
        let state = self.state.read();
        if state.records.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dims) = state.dimensions {
            if query.len() != dims {
                return Err(Error::InvalidQuery(format!(
                    "query vector has {} dimensions, index has {}",
                    query.len(),
                    dims
                )));
            }
        }

        let mut hits: Vec<VectorSearchResult> = state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .map(|record| VectorSearchResult {
                id: record.id.clone(),
                payload: record.payload.clone(),
                score: self.score(query, &record.vector),
            })
            .collect();

        // stable: equal scores keep insertion order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().records.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Filesystem blob store, one file per document
pub struct LocalDocumentStore {
    /// Directory to store documents
    storage_dir: PathBuf,
}

impl LocalDocumentStore {
    /// Create a new local document store
    pub fn new(storage_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self { storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get path for a document, rejecting ids that would escape the directory
    fn doc_path(&self, doc_id: &str) -> Result<PathBuf> {
        let valid = !doc_id.is_empty()
            && doc_id != "."
            && doc_id != ".."
            && !doc_id.contains(['/', '\\', '\0']);
        if !valid {
            return Err(Error::BlobStore(format!("invalid document id '{}'", doc_id)));
        }
        Ok(self.storage_dir.join(doc_id))
    }
}

#[async_trait]
impl DocumentStoreProvider for LocalDocumentStore {
    async fn put(&self, doc_id: &str, data: &[u8]) -> Result<()> {
        let path = self.doc_path(doc_id)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::BlobStore(format!("Failed to write {}: {}", doc_id, e)))
    }

    async fn get(&self, doc_id: &str) -> Result<Vec<u8>> {
        let path = self.doc_path(doc_id)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::BlobStore(format!("Failed to read document {}: {}", doc_id, e)))?;
        if data.is_empty() {
            return Err(Error::BlobStore(format!("document {} is empty", doc_id)));
        }
        Ok(data)
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        let path = self.doc_path(doc_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::BlobStore(format!("Failed to delete {}: {}", doc_id, e))),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.storage_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_pdf_name(name) {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

/// In-process blob store
#[derive(Default)]
pub struct MemoryDocumentStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStoreProvider for MemoryDocumentStore {
    async fn put(&self, doc_id: &str, data: &[u8]) -> Result<()> {
        self.blobs.write().insert(doc_id.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, doc_id: &str) -> Result<Vec<u8>> {
        match self.blobs.read().get(doc_id) {
            None => Err(Error::BlobStore(format!("document {} not found", doc_id))),
            Some(data) if data.is_empty() => {
                Err(Error::BlobStore(format!("document {} is empty", doc_id)))
            }
            Some(data) => Ok(data.clone()),
        }
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        self.blobs.write().remove(doc_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .keys()
            .filter(|id| is_pdf_name(id))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn is_pdf_name(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}
