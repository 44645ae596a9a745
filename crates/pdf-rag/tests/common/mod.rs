//! Shared fakes and fixtures for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as PdfDocument, Object, Stream};

use pdf_rag::config::{ChunkingConfig, EmbeddingConfig, RagConfig, RetryConfig};
use pdf_rag::error::{Result, ServiceFailure};
use pdf_rag::providers::{
    CompletionRequest, EmbeddingProvider, IndexRecord, LlmProvider, MemoryVectorStore,
    UpsertOutcome, VectorSearchResult, VectorStoreProvider,
};
use pdf_rag::Error;

pub const DIMS: usize = 256;
pub const MODEL: &str = "fake-embed";

/// Hashed bag-of-words embedder; texts sharing words get similar vectors
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[fnv1a(&word.to_lowercase()) % DIMS] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

fn fnv1a(word: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash as usize
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model(&self) -> &str {
        MODEL
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Embedder that always fails with a permanent error
pub struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::embedding(ServiceFailure::Auth, "invalid api key"))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model(&self) -> &str {
        MODEL
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Answers with the first context block of the prompt, verbatim
pub struct ExtractiveLlm {
    pub calls: AtomicUsize,
}

impl ExtractiveLlm {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ExtractiveLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = request
            .prompt
            .split_once("Content:\n")
            .and_then(|(_, rest)| rest.split_once("\n\n---").map(|(block, _)| block))
            .unwrap_or_default();
        Ok(answer.to_string())
    }

    fn name(&self) -> &str {
        "extractive"
    }

    fn model(&self) -> &str {
        "extractive"
    }
}

/// Memory store whose searches fail
pub struct SearchlessStore {
    pub inner: MemoryVectorStore,
}

#[async_trait]
impl VectorStoreProvider for SearchlessStore {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<Vec<UpsertOutcome>> {
        self.inner.upsert(records).await
    }

    async fn search(&self, _query: &[f32], _top_k: usize) -> Result<Vec<VectorSearchResult>> {
        Err(Error::vector_index(ServiceFailure::Auth, "index credentials rejected"))
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    fn name(&self) -> &str {
        "searchless"
    }
}

/// Configuration sized for the small test documents
pub fn test_config() -> RagConfig {
    RagConfig {
        chunking: ChunkingConfig {
            min_chars: 20,
            max_chars: 500,
            ..ChunkingConfig::default()
        },
        embeddings: EmbeddingConfig {
            model: MODEL.to_string(),
            dimensions: DIMS,
            ..EmbeddingConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
            call_timeout_secs: 5,
        },
        ..RagConfig::default()
    }
}

pub fn fake_providers() -> (Arc<FakeEmbedder>, Arc<ExtractiveLlm>, Arc<MemoryVectorStore>) {
    (
        Arc::new(FakeEmbedder::new()),
        Arc::new(ExtractiveLlm::new()),
        Arc::new(MemoryVectorStore::new(Default::default())),
    )
}

/// Build a PDF with one page per entry; each line becomes its own text object.
/// An empty slice gives a page with no text (like a scanned image).
pub fn build_pdf(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new(
                "Td",
                vec![50.into(), (750 - 20 * i as i64).into()],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content stream"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save test pdf");
    bytes
}

/// The two-page expense policy used across tests
pub fn policy_pdf() -> Vec<u8> {
    build_pdf(&[
        &["Employees must file expenses within 30 days."],
        &["Travel requires manager approval."],
    ])
}
