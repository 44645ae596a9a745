//! Retriever behaviour against the in-memory index

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{test_config, FakeEmbedder};
use pdf_rag::config::RetrievalConfig;
use pdf_rag::embeddings::Embedder;
use pdf_rag::ingestion::IndexWriter;
use pdf_rag::providers::{IndexRecord, MemoryVectorStore, VectorStoreProvider};
use pdf_rag::retrieval::Retriever;
use pdf_rag::retry::RetryPolicy;
use pdf_rag::types::ChunkPayload;
use pdf_rag::{Chunk, Error, PageRange};

const TEXTS: [&str; 5] = [
    "Employees must file expenses within 30 days.",
    "Travel requires manager approval before booking flights.",
    "Expense reports list every expense with receipts attached.",
    "The cafeteria opens at eight in the morning.",
    "Parking permits are renewed every January.",
];

struct Fixture {
    retriever: Retriever,
    embedder: Embedder,
    store: Arc<MemoryVectorStore>,
    cancel: CancellationToken,
}

async fn fixture(texts: &[&str]) -> Fixture {
    let config = test_config();
    let retry = RetryPolicy::no_retry(Duration::from_secs(5));
    let store = Arc::new(MemoryVectorStore::default());
    let embedder = Embedder::new(
        Arc::new(FakeEmbedder::new()),
        config.embeddings.clone(),
        retry.clone(),
    );
    let cancel = CancellationToken::new();

    let chunks: Vec<Chunk> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| Chunk::new("handbook.pdf", i as u32, PageRange::single(i as u32 + 1), text.to_string()))
        .collect();
    let chunks = embedder.embed_chunks(chunks, &cancel).await.unwrap();
    IndexWriter::new(store.clone(), 2, retry.clone())
        .upsert(&chunks, &cancel)
        .await
        .unwrap();

    Fixture {
        retriever: Retriever::new(
            embedder.clone(),
            store.clone(),
            RetrievalConfig::default(),
            retry,
        ),
        embedder,
        store,
        cancel,
    }
}

#[tokio::test]
async fn test_top_k_in_descending_order() {
    let f = fixture(&TEXTS).await;

    let result = f
        .retriever
        .retrieve("How many days to file an expense report?", 3, &f.cancel)
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    let scores: Vec<f32> = result.hits().iter().map(|h| h.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "scores {:?}", scores);
}

#[tokio::test]
async fn test_chunk_text_retrieves_itself_first() {
    let f = fixture(&TEXTS).await;

    for (i, text) in TEXTS.iter().enumerate() {
        let result = f.retriever.retrieve(text, 2, &f.cancel).await.unwrap();
        let top = result.top().unwrap();
        assert_eq!(top.chunk.chunk_index, i as u32);
        assert!((top.score - 1.0).abs() < 1e-4);
        assert_eq!(top.chunk.page_range, PageRange::single(i as u32 + 1));
    }
}

#[tokio::test]
async fn test_k_larger_than_index() {
    let f = fixture(&TEXTS[..2]).await;
    let result = f.retriever.retrieve("expenses", 10, &f.cancel).await.unwrap();
    assert_eq!(result.len(), 2);
}

#[tokio::test]
async fn test_empty_index_returns_nothing() {
    let f = fixture(&[]).await;
    let result = f.retriever.retrieve("expenses", 5, &f.cancel).await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_invalid_queries() {
    let f = fixture(&TEXTS).await;

    assert!(matches!(
        f.retriever.retrieve("expenses", 0, &f.cancel).await,
        Err(Error::InvalidQuery(_))
    ));
    assert!(matches!(
        f.retriever.retrieve("   ", 3, &f.cancel).await,
        Err(Error::InvalidQuery(_))
    ));
}

#[tokio::test]
async fn test_chunks_from_other_models_do_not_shrink_results() {
    let f = fixture(&TEXTS).await;
    let question = "How many days to file an expense report?";

    // Exact matches for the question, left behind by a previous model
    let vector = f.embedder.embed(question, &f.cancel).await.unwrap().vector;
    let stale: Vec<IndexRecord> = (0..6)
        .map(|i| IndexRecord {
            id: format!("legacy.pdf#{:05}", i),
            vector: vector.clone(),
            payload: ChunkPayload {
                chunk_id: format!("legacy.pdf#{:05}", i),
                document_id: "legacy.pdf".to_string(),
                chunk_index: i,
                page_start: 1,
                page_end: 1,
                content: question.to_string(),
                model: "legacy-embed".to_string(),
            },
        })
        .collect();
    f.store.upsert(&stale).await.unwrap();

    let result = f.retriever.retrieve(question, 3, &f.cancel).await.unwrap();
    assert_eq!(result.len(), 3);
    assert!(result
        .hits()
        .iter()
        .all(|h| h.chunk.document_id == "handbook.pdf"));

    let all = f.retriever.retrieve(question, 20, &f.cancel).await.unwrap();
    assert_eq!(all.len(), TEXTS.len());
}
