//! Writes embedded chunks to the vector index

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, Stage};
use crate::providers::{IndexRecord, VectorStoreProvider};
use crate::retry::RetryPolicy;
use crate::types::Chunk;

/// Result of an upsert run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertReport {
    /// Chunk ids now present in the index
    pub written: Vec<String>,
    /// Chunk ids that were not written, with the reason
    pub failed: Vec<(String, String)>,
}

impl UpsertReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failed.iter().map(|(id, _)| id.clone()).collect()
    }
}

/// Batched, retried upserts keyed by chunk id
#[derive(Clone)]
pub struct IndexWriter {
    store: Arc<dyn VectorStoreProvider>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl IndexWriter {
    pub fn new(store: Arc<dyn VectorStoreProvider>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    /// Upsert every chunk, continuing past failed batches
    ///
    /// Returns the full report when everything was written, and
    /// `Error::IndexWrite` naming both the failed and the written ids otherwise.
    pub async fn upsert(&self, chunks: &[Chunk], cancel: &CancellationToken) -> Result<UpsertReport> {
        let report = self.upsert_partial(chunks, cancel).await?;
        if report.is_complete() {
            return Ok(report);
        }

        let first_reason = report
            .failed
            .first()
            .map(|(_, reason)| reason.clone())
            .unwrap_or_default();
        Err(Error::index_write(
            report.failed_ids(),
            report.written,
            first_reason,
        ))
    }

    /// Like [`Self::upsert`] but always returns the report unless cancelled
    pub async fn upsert_partial(
        &self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();

        let mut records = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match &chunk.embedding {
                Some(embedding) => records.push(IndexRecord {
                    id: chunk.id.clone(),
                    vector: embedding.vector.clone(),
                    payload: chunk.to_payload(),
                }),
                None => report
                    .failed
                    .push((chunk.id.clone(), "chunk has no embedding".to_string())),
            }
        }

        for batch in records.chunks(self.batch_size) {
            let store = &self.store;
            let outcome = self
                .retry
                .run(Stage::Indexing, cancel, Error::vector_index, || store.upsert(batch))
                .await;

            match outcome {
                Ok(outcomes) => {
                    for record in batch {
                        match outcomes.iter().find(|o| o.id == record.id) {
                            Some(o) if o.is_ok() => report.written.push(record.id.clone()),
                            Some(o) => report.failed.push((
                                record.id.clone(),
                                o.error.clone().unwrap_or_default(),
                            )),
                            None => report
                                .failed
                                .push((record.id.clone(), "no outcome reported".to_string())),
                        }
                    }
                }
                Err(err @ Error::Cancelled(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        store = self.store.name(),
                        records = batch.len(),
                        "Upsert batch failed: {}",
                        err
                    );
                    let reason = err.to_string();
                    report
                        .failed
                        .extend(batch.iter().map(|r| (r.id.clone(), reason.clone())));
                }
            }
        }

        tracing::debug!(
            written = report.written.len(),
            failed = report.failed.len(),
            "Upsert finished"
        );
        Ok(report)
    }
}
