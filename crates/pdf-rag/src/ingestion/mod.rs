//! Ingestion components: extraction, semantic chunking and index writes

mod chunker;
mod extractor;
mod indexer;

pub use chunker::{ChunkOutcome, ChunkWarning, SemanticChunker, Sentence};
pub use extractor::{cleanup_pdf_text, ExtractedDocument, PageIssue, PageText, PdfExtractor};
pub use indexer::{IndexWriter, UpsertReport};
