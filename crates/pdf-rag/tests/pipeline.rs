//! End-to-end ingestion and query flows with in-process fakes

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::{
    build_pdf, fake_providers, policy_pdf, test_config, BrokenEmbedder, ExtractiveLlm,
    FakeEmbedder, SearchlessStore,
};
use pdf_rag::config::ChunkingConfig;
use pdf_rag::error::ExtractionError;
use pdf_rag::ingestion::ChunkWarning;
use pdf_rag::pipeline::{IngestionState, QueryState};
use pdf_rag::providers::{MemoryDocumentStore, MemoryVectorStore, VectorStoreProvider};
use pdf_rag::types::response::NOT_FOUND_ANSWER;
use pdf_rag::{Error, PageRange, Pipeline, Stage};

fn pipeline() -> (Pipeline, Arc<ExtractiveLlm>, Arc<MemoryVectorStore>) {
    let (embedder, llm, store) = fake_providers();
    let pipeline = Pipeline::new(test_config(), embedder, llm.clone(), store.clone()).unwrap();
    (pipeline, llm, store)
}

#[tokio::test]
async fn test_policy_document_answers_with_citation() {
    let (pipeline, llm, _store) = pipeline();
    let cancel = CancellationToken::new();

    let report = pipeline
        .ingest("policy.pdf", "policy.pdf", policy_pdf(), &cancel)
        .await;
    assert!(report.is_done(), "ingestion failed: {:?}", report.error());
    assert_eq!(report.chunk_ids, vec!["policy.pdf#00000", "policy.pdf#00001"]);
    assert_eq!(report.document.as_ref().unwrap().total_pages, 2);
    assert_eq!(report.document.as_ref().unwrap().total_chunks, 2);
    assert_eq!(
        report.trace,
        vec![
            IngestionState::Idle,
            IngestionState::Extracting,
            IngestionState::Chunking,
            IngestionState::Embedding,
            IngestionState::Indexing,
            IngestionState::Done,
        ]
    );
    assert_eq!(pipeline.indexed_chunks().await.unwrap(), 2);

    let report = pipeline
        .query("How many days do employees have to file expenses?", None, &cancel)
        .await;
    assert_eq!(report.state, QueryState::Done);
    assert_eq!(report.chunks_retrieved(), 2);

    let answer = report.into_result().unwrap();
    assert!(answer.grounded);
    assert!(answer.text.contains("30 days"), "answer was {:?}", answer.text);
    let top = &answer.context[0];
    assert_eq!(top.chunk.id, "policy.pdf#00000");
    assert_eq!(top.chunk.page_range, PageRange::single(1));
    assert!(top.score > answer.context[1].score);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_default_chunking_keeps_topics_apart() {
    let (embedder, llm, store) = fake_providers();
    let config = pdf_rag::RagConfig {
        chunking: ChunkingConfig::default(),
        ..test_config()
    };
    let pipeline = Pipeline::new(config, embedder, llm, store).unwrap();
    let cancel = CancellationToken::new();

    let report = pipeline
        .ingest("policy.pdf", "policy.pdf", policy_pdf(), &cancel)
        .await;
    assert!(report.is_done(), "ingestion failed: {:?}", report.error());
    assert_eq!(report.chunk_ids, vec!["policy.pdf#00000", "policy.pdf#00001"]);

    let answer = pipeline
        .query("How many days do employees have to file expenses?", None, &cancel)
        .await
        .into_result()
        .unwrap();
    assert!(answer.text.contains("30 days"), "answer was {:?}", answer.text);
    assert!(!answer.text.contains("Travel"), "answer was {:?}", answer.text);
}

#[tokio::test]
async fn test_non_pdf_fails_at_extraction() {
    let (pipeline, _llm, store) = pipeline();

    let report = pipeline
        .ingest(
            "notes.txt",
            "notes.txt",
            b"just some plain text".to_vec(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        report.state,
        IngestionState::Failed {
            stage: Stage::Extracting,
            ..
        }
    ));
    assert!(report.chunk_ids.is_empty());
    assert!(store.is_empty().await.unwrap());

    let err = report.into_result().unwrap_err();
    assert_eq!(err.stage, Stage::Extracting);
    assert!(matches!(
        err.source,
        Error::Extraction(ExtractionError::NotPdf)
    ));
}

#[tokio::test]
async fn test_scanned_pdf_ingests_with_warning() {
    let (pipeline, _llm, store) = pipeline();
    let pdf = build_pdf(&[&[], &[]]);

    let report = pipeline
        .ingest("scan.pdf", "scan.pdf", pdf, &CancellationToken::new())
        .await;

    assert!(report.is_done());
    assert!(report.chunk_ids.is_empty());
    assert_eq!(report.warnings, vec![ChunkWarning::NoExtractableText]);
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_blank_page_keeps_other_page_numbers() {
    let (pipeline, _llm, store) = pipeline();
    let pdf = build_pdf(&[
        &["Employees must file expenses within 30 days."],
        &[],
        &["Travel requires manager approval."],
    ]);

    let report = pipeline
        .ingest("gappy.pdf", "gappy.pdf", pdf, &CancellationToken::new())
        .await;

    assert!(report.is_done());
    assert_eq!(report.warnings, vec![ChunkWarning::PagesWithoutText(vec![2])]);
    let last = store.get("gappy.pdf#00001").unwrap();
    assert_eq!(last.payload.page_start, 3);
    assert_eq!(last.payload.page_end, 3);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let (pipeline, _llm, store) = pipeline();
    let cancel = CancellationToken::new();

    let first = pipeline
        .ingest("policy.pdf", "policy.pdf", policy_pdf(), &cancel)
        .await;
    let before = store.records();
    let second = pipeline
        .ingest("policy.pdf", "policy.pdf", policy_pdf(), &cancel)
        .await;

    assert!(first.is_done() && second.is_done());
    assert_eq!(first.chunk_ids, second.chunk_ids);
    assert_eq!(store.len().await.unwrap(), 2);
    assert_eq!(store.records(), before);
}

#[tokio::test]
async fn test_cancelled_ingestion_writes_nothing() {
    let (pipeline, _llm, store) = pipeline();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = pipeline
        .ingest("policy.pdf", "policy.pdf", policy_pdf(), &cancel)
        .await;

    assert!(matches!(report.error(), Some(Error::Cancelled(_))));
    assert!(report.state.is_terminal());
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_embedding_failure_stops_before_index() {
    let llm = Arc::new(ExtractiveLlm::new());
    let store = Arc::new(MemoryVectorStore::new(Default::default()));
    let pipeline = Pipeline::new(test_config(), Arc::new(BrokenEmbedder), llm, store.clone()).unwrap();

    let report = pipeline
        .ingest("policy.pdf", "policy.pdf", policy_pdf(), &CancellationToken::new())
        .await;

    assert_eq!(
        report.state.stage(),
        Some(Stage::Embedding),
        "state was {:?}",
        report.state
    );
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_retrieval_failure_never_calls_model() {
    let embedder = Arc::new(FakeEmbedder::new());
    let llm = Arc::new(ExtractiveLlm::new());
    let store = Arc::new(SearchlessStore {
        inner: MemoryVectorStore::new(Default::default()),
    });
    let pipeline = Pipeline::new(test_config(), embedder, llm.clone(), store).unwrap();
    let cancel = CancellationToken::new();

    let ingested = pipeline
        .ingest("policy.pdf", "policy.pdf", policy_pdf(), &cancel)
        .await;
    assert!(ingested.is_done());

    let report = pipeline.query("How long to file expenses?", None, &cancel).await;
    assert!(matches!(
        report.state,
        QueryState::Failed {
            stage: Stage::Retrieving,
            ..
        }
    ));
    assert_eq!(llm.calls(), 0);
    let err = report.into_result().unwrap_err();
    assert!(matches!(err.source, Error::VectorIndex { .. }));
}

#[tokio::test]
async fn test_query_on_empty_index_returns_fallback() {
    let (pipeline, llm, _store) = pipeline();

    let answer = pipeline
        .query("Anything at all?", Some(3), &CancellationToken::new())
        .await
        .into_result()
        .unwrap();

    assert_eq!(answer.text, NOT_FOUND_ANSWER);
    assert!(answer.context.is_empty());
    assert!(!answer.grounded);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_zero_k_is_invalid_query() {
    let (pipeline, llm, _store) = pipeline();

    let report = pipeline
        .query("How long?", Some(0), &CancellationToken::new())
        .await;

    assert!(matches!(report.error(), Some(Error::InvalidQuery(_))));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_stored_document_flows() {
    let (embedder, llm, store) = fake_providers();
    let documents = Arc::new(MemoryDocumentStore::new());
    let pipeline =
        Pipeline::with_document_store(test_config(), embedder, llm, store, documents).unwrap();
    let cancel = CancellationToken::new();

    let stored = pipeline
        .store_and_ingest("policy.pdf", policy_pdf(), &cancel)
        .await;
    assert!(stored.is_done());
    assert_eq!(stored.trace[1], IngestionState::Fetching);
    assert_eq!(pipeline.list_documents().await.unwrap(), vec!["policy.pdf"]);

    let again = pipeline.ingest_stored("policy.pdf", &cancel).await;
    assert!(again.is_done());
    assert_eq!(again.chunk_ids, stored.chunk_ids);

    let missing = pipeline.ingest_stored("missing.pdf", &cancel).await;
    assert_eq!(missing.state.stage(), Some(Stage::Fetching));
    assert!(matches!(missing.error(), Some(Error::BlobStore(_))));
}

#[tokio::test]
async fn test_unreadable_upload_is_not_kept_in_store() {
    let (embedder, llm, store) = fake_providers();
    let documents = Arc::new(MemoryDocumentStore::new());
    let pipeline =
        Pipeline::with_document_store(test_config(), embedder, llm, store, documents).unwrap();
    let cancel = CancellationToken::new();

    let report = pipeline
        .store_and_ingest("notes.pdf", b"plain text, not a pdf".to_vec(), &cancel)
        .await;
    assert_eq!(report.state.stage(), Some(Stage::Extracting));
    assert!(matches!(
        report.error(),
        Some(Error::Extraction(ExtractionError::NotPdf))
    ));
    assert!(pipeline.list_documents().await.unwrap().is_empty());

    let kept = pipeline
        .store_and_ingest("policy.pdf", policy_pdf(), &cancel)
        .await;
    assert!(kept.is_done());
    assert_eq!(pipeline.list_documents().await.unwrap(), vec!["policy.pdf"]);
}

#[tokio::test]
async fn test_list_without_document_store_is_config_error() {
    let (pipeline, _llm, _store) = pipeline();
    assert!(!pipeline.has_document_store());
    assert!(matches!(
        pipeline.list_documents().await,
        Err(Error::Config(_))
    ));
}
