//! Query embedding and nearest-neighbour search

pub mod similarity;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::error::{Error, Result, Stage};
use crate::providers::VectorStoreProvider;
use crate::retry::RetryPolicy;
use crate::types::{Chunk, Query, RetrievalResult, ScoredChunk};

/// Embeds questions and asks the vector index for the top-k chunks
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    store: Arc<dyn VectorStoreProvider>,
    config: RetrievalConfig,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(
        embedder: Embedder,
        store: Arc<dyn VectorStoreProvider>,
        config: RetrievalConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
            retry,
        }
    }

    /// Top-`k` chunks for `query_text`, best first
    ///
    /// Fewer than `k` hits come back only when the index holds fewer
    /// compatible chunks, or when `min_score` cuts the tail.
    pub async fn retrieve(
        &self,
        query_text: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(Error::InvalidQuery("k must be at least 1".to_string()));
        }
        if query_text.trim().is_empty() {
            return Err(Error::InvalidQuery("query text is empty".to_string()));
        }

        let mut query = Query::new(query_text);
        let embedding = self.embedder.embed(&query.text, cancel).await?;
        let vector = &query.embedding.insert(embedding).vector;

        // Chunks from another embedding model are skipped, so widen the
        // search until k compatible hits are found or the index runs out.
        let model = self.embedder.model();
        let store = &self.store;
        let mut fetch = k;
        let (scored, skipped) = loop {
            let hits = self
                .retry
                .run(Stage::Retrieving, cancel, Error::vector_index, || {
                    store.search(vector, fetch)
                })
                .await?;
            let exhausted = hits.len() < fetch;

            let (compatible, stale): (Vec<_>, Vec<_>) = hits
                .into_iter()
                .partition(|hit| hit.payload.model.is_empty() || hit.payload.model == model);
            if compatible.len() >= k || stale.is_empty() || exhausted {
                let scored: Vec<ScoredChunk> = compatible
                    .into_iter()
                    .filter(|hit| self.config.min_score.map_or(true, |min| hit.score >= min))
                    .map(|hit| ScoredChunk {
                        chunk: Chunk::from_payload(&hit.payload),
                        score: hit.score,
                    })
                    .collect();
                break (scored, stale);
            }
            fetch = fetch.saturating_mul(2);
        };

        if let Some(first) = skipped.first() {
            tracing::warn!(
                skipped = skipped.len(),
                "Skipping chunks embedded with model '{}' (query uses '{}')",
                first.payload.model,
                model
            );
        }

        let result = RetrievalResult::new(scored, k);
        tracing::debug!(
            k,
            hits = result.len(),
            top_score = result.top().map(|h| h.score),
            "Retrieved chunks"
        );
        Ok(result)
    }
}
