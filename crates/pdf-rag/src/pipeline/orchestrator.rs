//! Ingestion and query flows

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{BackendProvider, RagConfig, SimilaritySignal};
use crate::embeddings::Embedder;
use crate::error::{Error, Result, Stage};
use crate::generation::AnswerGenerator;
use crate::ingestion::{ChunkOutcome, ExtractedDocument, IndexWriter, PdfExtractor, SemanticChunker};
use crate::providers::{
    DocumentStoreProvider, EmbeddingProvider, LlmProvider, LocalDocumentStore, MemoryVectorStore,
    OllamaProvider, OpenAiEmbedder, OpenAiLlm, VectorStoreProvider,
};
use crate::retrieval::Retriever;
use crate::retry::RetryPolicy;
use crate::types::Document;

use super::state::{IngestionReport, IngestionState, QueryReport, QueryState};

/// Sequences the ingestion and query flows
///
/// Cheap to clone; holds only configuration and collaborator handles.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    config: RagConfig,
    extractor: PdfExtractor,
    chunker: SemanticChunker,
    embedder: Embedder,
    writer: IndexWriter,
    retriever: Retriever,
    generator: AnswerGenerator,
    store: Arc<dyn VectorStoreProvider>,
    documents: Option<Arc<dyn DocumentStoreProvider>>,
}

impl Pipeline {
    /// Wire the pipeline from explicit collaborators
    pub fn new(
        config: RagConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Result<Self> {
        Self::build(config, embeddings, llm, store, None)
    }

    /// Same as [`Pipeline::new`] with a blob store for stored-document flows
    pub fn with_document_store(
        config: RagConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStoreProvider>,
        documents: Arc<dyn DocumentStoreProvider>,
    ) -> Result<Self> {
        Self::build(config, embeddings, llm, store, Some(documents))
    }

    /// Build providers from configuration
    pub fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;

        let (embeddings, llm): (Arc<dyn EmbeddingProvider>, Arc<dyn LlmProvider>) =
            match config.backend {
                BackendProvider::Ollama => {
                    let (embedder, llm) = OllamaProvider::new(&config)?.split();
                    (Arc::new(embedder), Arc::new(llm))
                }
                BackendProvider::OpenAi => (
                    Arc::new(OpenAiEmbedder::new(&config)?),
                    Arc::new(OpenAiLlm::new(&config)?),
                ),
            };
        let store = Arc::new(MemoryVectorStore::new(config.index.metric));
        let documents = Arc::new(LocalDocumentStore::new(config.storage.storage_dir.clone())?);

        tracing::info!(
            backend = ?config.backend,
            embed_model = embeddings.model(),
            generate_model = llm.model(),
            storage = %config.storage.storage_dir.display(),
            "Pipeline configured"
        );

        Self::with_document_store(config, embeddings, llm, store, documents)
    }

    fn build(
        config: RagConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStoreProvider>,
        documents: Option<Arc<dyn DocumentStoreProvider>>,
    ) -> Result<Self> {
        let retry = RetryPolicy::new(&config.retry);
        let chunker = SemanticChunker::new(config.chunking.clone())?;
        let embedder = Embedder::new(embeddings, config.embeddings.clone(), retry.clone());
        let writer = IndexWriter::new(Arc::clone(&store), config.index.upsert_batch_size, retry.clone());
        let retriever = Retriever::new(
            embedder.clone(),
            Arc::clone(&store),
            config.retrieval.clone(),
            retry.clone(),
        );
        let generator = AnswerGenerator::new(llm, config.llm.clone(), retry);

        Ok(Self {
            inner: Arc::new(PipelineInner {
                extractor: PdfExtractor::new(&config.extraction),
                chunker,
                embedder,
                writer,
                retriever,
                generator,
                store,
                documents,
                config,
            }),
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// Whether stored-document flows are available
    pub fn has_document_store(&self) -> bool {
        self.inner.documents.is_some()
    }

    /// Number of chunk vectors in the index
    pub async fn indexed_chunks(&self) -> Result<usize> {
        self.inner.store.len().await
    }

    /// Extract, chunk, embed and index one PDF
    pub async fn ingest(
        &self,
        document_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> IngestionReport {
        let span = tracing::info_span!("ingest", document_id, bytes = bytes.len());
        let report = IngestionReport::new(document_id);
        self.run_ingest(report, filename, bytes, cancel)
            .instrument(span)
            .await
    }

    /// Fetch a PDF from the blob store and ingest it
    pub async fn ingest_stored(&self, document_id: &str, cancel: &CancellationToken) -> IngestionReport {
        let span = tracing::info_span!("ingest", document_id, stored = true);
        async {
            let mut report = IngestionReport::new(document_id);
            report.enter(IngestionState::Fetching);
            if cancel.is_cancelled() {
                return report.fail(Error::Cancelled(Stage::Fetching));
            }
            let bytes = match self.fetch(document_id).await {
                Ok(bytes) => bytes,
                Err(e) => return report.fail(e),
            };
            self.run_ingest(report, document_id, bytes, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Store a PDF in the blob store, then ingest it
    ///
    /// Bytes that fail extraction are removed from the store again, so
    /// only readable PDFs show up in [`Pipeline::list_documents`].
    pub async fn store_and_ingest(
        &self,
        document_id: &str,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> IngestionReport {
        let span = tracing::info_span!("ingest", document_id, bytes = bytes.len(), stored = true);
        async {
            let mut report = IngestionReport::new(document_id);
            report.enter(IngestionState::Fetching);
            if cancel.is_cancelled() {
                return report.fail(Error::Cancelled(Stage::Fetching));
            }
            let stored = match self.documents() {
                Ok(documents) => documents.put(document_id, &bytes).await,
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                return report.fail(e);
            }
            let report = self.run_ingest(report, document_id, bytes, cancel).await;
            if matches!(report.error(), Some(Error::Extraction(_))) {
                self.discard(document_id).await;
            }
            report
        }
        .instrument(span)
        .await
    }

    /// PDF ids available in the blob store
    pub async fn list_documents(&self) -> Result<Vec<String>> {
        self.documents()?.list().await
    }

    /// Answer a question from the indexed chunks
    pub async fn query(
        &self,
        question: &str,
        top_k: Option<usize>,
        cancel: &CancellationToken,
    ) -> QueryReport {
        let span = tracing::info_span!("query", question_len = question.len());
        self.run_query(question, top_k, cancel).instrument(span).await
    }

    fn documents(&self) -> Result<&Arc<dyn DocumentStoreProvider>> {
        self.inner
            .documents
            .as_ref()
            .ok_or_else(|| Error::Config("no document store configured".to_string()))
    }

    async fn discard(&self, document_id: &str) {
        if let Ok(documents) = self.documents() {
            match documents.delete(document_id).await {
                Ok(()) => tracing::info!(document_id, "Removed unreadable upload from store"),
                Err(e) => tracing::warn!(document_id, "Failed to remove unreadable upload: {}", e),
            }
        }
    }

    async fn fetch(&self, document_id: &str) -> Result<Vec<u8>> {
        let bytes = self.documents()?.get(document_id).await?;
        if bytes.is_empty() {
            return Err(Error::BlobStore(format!("document {} is empty", document_id)));
        }
        Ok(bytes)
    }

    async fn run_ingest(
        &self,
        mut report: IngestionReport,
        filename: &str,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> IngestionReport {
        let started = Instant::now();
        let document_id = report.document_id.clone();
        let mut document = Document::new(&document_id, filename, &bytes);

        // Extracting
        report.enter(IngestionState::Extracting);
        if cancel.is_cancelled() {
            return report.fail(Error::Cancelled(Stage::Extracting));
        }
        let extractor = self.inner.extractor.clone();
        let extracted = match run_blocking(move || extractor.extract(&bytes)).await {
            Ok(extracted) => extracted,
            Err(e) => return report.fail(e),
        };
        document.total_pages = extracted.page_count() as u32;
        report.document = Some(document.clone());

        // Chunking
        report.enter(IngestionState::Chunking);
        if cancel.is_cancelled() {
            return report.fail(Error::Cancelled(Stage::Chunking));
        }
        let outcome = match self.chunk(&document_id, extracted, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => return report.fail(e),
        };
        for warning in &outcome.warnings {
            tracing::warn!(document_id = %document_id, "{}", warning);
        }
        report.warnings = outcome.warnings;

        // Embedding
        report.enter(IngestionState::Embedding);
        if cancel.is_cancelled() {
            return report.fail(Error::Cancelled(Stage::Embedding));
        }
        let chunks = match self.inner.embedder.embed_chunks(outcome.chunks, cancel).await {
            Ok(chunks) => chunks,
            Err(e) => return report.fail(e),
        };

        // Indexing
        report.enter(IngestionState::Indexing);
        if cancel.is_cancelled() {
            return report.fail(Error::Cancelled(Stage::Indexing));
        }
        match self.inner.writer.upsert(&chunks, cancel).await {
            Ok(written) => report.chunk_ids = written.written,
            Err(e) => {
                if let Error::IndexWrite { written, .. } = &e {
                    report.chunk_ids = written.clone();
                }
                return report.fail(e);
            }
        }

        document.total_chunks = chunks.len() as u32;
        report.document = Some(document);
        report.enter(IngestionState::Done);
        tracing::info!(
            document_id = %document_id,
            chunks = report.chunk_ids.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Document ingested"
        );
        report
    }

    async fn chunk(
        &self,
        document_id: &str,
        extracted: ExtractedDocument,
        cancel: &CancellationToken,
    ) -> Result<ChunkOutcome> {
        let chunker = self.inner.chunker.clone();
        let doc_id = document_id.to_string();

        let signal = chunker.config().signal;
        match signal {
            SimilaritySignal::Lexical => {
                run_blocking(move || chunker.chunk(&doc_id, &extracted.pages)).await
            }
            SimilaritySignal::Embedding => {
                let texts: Vec<String> = chunker
                    .sentences(&extracted.pages)
                    .into_iter()
                    .map(|s| s.text)
                    .collect();
                let vectors: Vec<Vec<f32>> = self
                    .inner
                    .embedder
                    .embed_batch(&texts, cancel)
                    .await?
                    .into_iter()
                    .map(|e| e.vector)
                    .collect();
                run_blocking(move || chunker.chunk_with_vectors(&doc_id, &extracted.pages, &vectors))
                    .await
            }
        }
    }

    async fn run_query(
        &self,
        question: &str,
        top_k: Option<usize>,
        cancel: &CancellationToken,
    ) -> QueryReport {
        let started = Instant::now();
        let mut report = QueryReport::new();
        let k = top_k.unwrap_or(self.inner.config.retrieval.top_k);

        report.enter(QueryState::Retrieving);
        let retrieval = if cancel.is_cancelled() {
            Err(Error::Cancelled(Stage::Retrieving))
        } else {
            self.inner.retriever.retrieve(question, k, cancel).await
        };
        let retrieval = match retrieval {
            Ok(retrieval) => retrieval,
            Err(e) => {
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                return report.fail(e);
            }
        };

        report.enter(QueryState::Generating);
        let answer = if cancel.is_cancelled() {
            Err(Error::Cancelled(Stage::Generating))
        } else {
            self.inner.generator.generate(question, &retrieval, cancel).await
        };
        report.retrieval = Some(retrieval);
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        match answer {
            Ok(answer) => {
                tracing::info!(
                    retrieved = report.chunks_retrieved(),
                    used = answer.context.len(),
                    grounded = answer.grounded,
                    elapsed_ms = report.elapsed_ms,
                    "Query answered"
                );
                report.answer = Some(answer);
                report.enter(QueryState::Done);
                report
            }
            Err(e) => report.fail(e),
        }
    }
}

/// Run CPU-bound work off the async runtime
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
}
