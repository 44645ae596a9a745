//! Semantic chunking with adaptive similarity breakpoints
//!
//! Page text is split into sentences (never across pages). For every gap
//! between adjacent sentences, the window of sentences ending at the gap is
//! compared with the window starting after it; a gap whose similarity falls
//! below the document's adaptive threshold is a candidate boundary. Chunks
//! are then assembled greedily inside the configured size band.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{Breakpoint, ChunkingConfig};
use crate::error::{Error, Result};
use crate::retrieval::similarity;
use crate::types::{Chunk, PageRange};

use super::extractor::PageText;

/// A sentence (or a piece of an overlong one) with its page
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub text: String,
    pub page: u32,
    chars: usize,
}

impl Sentence {
    fn new(text: String, page: u32) -> Self {
        let chars = text.chars().count();
        Self { text, page, chars }
    }
}

/// Non-fatal observations made while chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ChunkWarning {
    /// No page produced text; the document yields no chunks
    NoExtractableText,
    /// Pages that contributed no text
    PagesWithoutText(Vec<u32>),
}

impl std::fmt::Display for ChunkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkWarning::NoExtractableText => write!(f, "document has no extractable text"),
            ChunkWarning::PagesWithoutText(pages) => {
                write!(f, "pages without text: {:?}", pages)
            }
        }
    }
}

/// Chunks plus any warnings
#[derive(Debug, Clone, Default)]
pub struct ChunkOutcome {
    pub chunks: Vec<Chunk>,
    pub warnings: Vec<ChunkWarning>,
}

/// Deterministic semantic chunker
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    config: ChunkingConfig,
}

impl SemanticChunker {
    /// Create a chunker, rejecting an unusable size band
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.max_chars == 0 {
            return Err(Error::Chunking("max_chars must be greater than zero".to_string()));
        }
        if config.min_chars > config.max_chars {
            return Err(Error::Chunking(format!(
                "min_chars ({}) exceeds max_chars ({})",
                config.min_chars, config.max_chars
            )));
        }
        if let Breakpoint::Percentile { percentile } = config.breakpoint {
            if !(0.0..=100.0).contains(&percentile) {
                return Err(Error::Chunking(format!(
                    "breakpoint percentile {} outside 0..=100",
                    percentile
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split pages into sentences, pieces of overlong sentences capped at `max_chars`
    pub fn sentences(&self, pages: &[PageText]) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        for page in pages {
            let normalized = page.text.split_whitespace().collect::<Vec<_>>().join(" ");
            for raw in normalized.split_sentence_bounds() {
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }
                for piece in split_long(raw, self.config.max_chars) {
                    sentences.push(Sentence::new(piece, page.number));
                }
            }
        }
        sentences
    }

    /// Chunk using the local lexical similarity signal
    pub fn chunk(&self, document_id: &str, pages: &[PageText]) -> Result<ChunkOutcome> {
        let sentences = self.sentences(pages);
        let vectors: Vec<TermVector> = sentences.iter().map(|s| term_vector(&s.text)).collect();
        let similarities =
            gap_similarities(&vectors, self.config.buffer_size, merge_terms, sparse_cosine);
        self.assemble(document_id, pages, sentences, &similarities)
    }

    /// Chunk using one embedding per sentence (in [`Self::sentences`] order)
    pub fn chunk_with_vectors(
        &self,
        document_id: &str,
        pages: &[PageText],
        sentence_vectors: &[Vec<f32>],
    ) -> Result<ChunkOutcome> {
        let sentences = self.sentences(pages);
        if sentence_vectors.len() != sentences.len() {
            return Err(Error::Chunking(format!(
                "expected {} sentence vectors, got {}",
                sentences.len(),
                sentence_vectors.len()
            )));
        }
        let similarities = gap_similarities(
            sentence_vectors,
            self.config.buffer_size,
            sum_vectors,
            |a, b| similarity::cosine(a, b),
        );
        self.assemble(document_id, pages, sentences, &similarities)
    }

    fn assemble(
        &self,
        document_id: &str,
        pages: &[PageText],
        sentences: Vec<Sentence>,
        similarities: &[f32],
    ) -> Result<ChunkOutcome> {
        let mut outcome = ChunkOutcome::default();

        let blank: Vec<u32> = pages
            .iter()
            .filter(|p| p.text.trim().is_empty())
            .map(|p| p.number)
            .collect();

        if sentences.is_empty() {
            outcome.warnings.push(ChunkWarning::NoExtractableText);
            return Ok(outcome);
        }
        if !blank.is_empty() {
            outcome.warnings.push(ChunkWarning::PagesWithoutText(blank));
        }

        let threshold = self.threshold(similarities);
        let mut queue: VecDeque<(Sentence, bool)> = sentences
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let boundary = similarities.get(i).is_some_and(|&sim| sim < threshold);
                (s, boundary)
            })
            .collect();

        let (min, max) = (self.config.min_chars, self.config.max_chars);
        let mut builder = ChunkBuilder::default();

        while let Some((sentence, boundary_after)) = queue.pop_front() {
            if !builder.is_empty() && builder.len + 1 + sentence.chars > max {
                if builder.len < min {
                    // fill up to max rather than emitting an undersized chunk
                    let capacity = max - builder.len - 1;
                    if let Some((head, tail)) = split_to_fit(&sentence.text, capacity) {
                        builder.push(Sentence::new(head, sentence.page));
                        builder.finish_into(document_id, &mut outcome.chunks);
                        queue.push_front((Sentence::new(tail, sentence.page), boundary_after));
                        continue;
                    }
                }
                builder.finish_into(document_id, &mut outcome.chunks);
            }

            builder.push(sentence);
            if boundary_after && builder.len >= min {
                builder.finish_into(document_id, &mut outcome.chunks);
            }
        }
        builder.finish_into(document_id, &mut outcome.chunks);

        tracing::debug!(
            document_id,
            chunks = outcome.chunks.len(),
            threshold,
            "Chunked document"
        );
        Ok(outcome)
    }

    /// Effective boundary threshold for a document's gap similarities
    fn threshold(&self, similarities: &[f32]) -> f32 {
        if similarities.is_empty() {
            return self.config.similarity_floor;
        }
        let adaptive = match self.config.breakpoint {
            Breakpoint::StdDev { k } => {
                let (mean, std_dev) = mean_std_dev(similarities);
                mean - k * std_dev
            }
            Breakpoint::Percentile { percentile } => {
                percentile_value(similarities, 100.0 - percentile)
            }
        };
        adaptive.max(self.config.similarity_floor)
    }
}

#[derive(Default)]
struct ChunkBuilder {
    parts: Vec<String>,
    pages: Option<PageRange>,
    len: usize,
}

impl ChunkBuilder {
    fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn push(&mut self, sentence: Sentence) {
        if !self.parts.is_empty() {
            self.len += 1;
        }
        self.len += sentence.chars;
        match self.pages.as_mut() {
            Some(range) => range.extend_to(sentence.page),
            None => self.pages = Some(PageRange::single(sentence.page)),
        }
        self.parts.push(sentence.text);
    }

    fn finish_into(&mut self, document_id: &str, chunks: &mut Vec<Chunk>) {
        let builder = std::mem::take(self);
        if let Some(range) = builder.pages {
            let index = chunks.len() as u32;
            chunks.push(Chunk::new(document_id, index, range, builder.parts.join(" ")));
        }
    }
}

type TermVector = HashMap<String, f32>;

/// Lowercased alphanumeric term frequencies
fn term_vector(text: &str) -> TermVector {
    let mut terms = TermVector::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *terms.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

fn merge_terms(window: &[TermVector]) -> TermVector {
    let mut merged = TermVector::new();
    for terms in window {
        for (term, count) in terms {
            *merged.entry(term.clone()).or_insert(0.0) += count;
        }
    }
    merged
}

fn sparse_cosine(a: &TermVector, b: &TermVector) -> f32 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f32 = small
        .iter()
        .filter_map(|(term, x)| large.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn sum_vectors(window: &[Vec<f32>]) -> Vec<f32> {
    let dims = window.first().map_or(0, Vec::len);
    let mut sum = vec![0.0; dims];
    for vector in window {
        for (acc, x) in sum.iter_mut().zip(vector) {
            *acc += x;
        }
    }
    sum
}

/// Similarity across each gap: window `[i - buffer, i]` vs `[i + 1, i + 1 + buffer]`
fn gap_similarities<V, W, A, S>(items: &[V], buffer: usize, aggregate: A, score: S) -> Vec<f32>
where
    A: Fn(&[V]) -> W,
    S: Fn(&W, &W) -> f32,
{
    if items.len() < 2 {
        return Vec::new();
    }
    (0..items.len() - 1)
        .map(|i| {
            let left = aggregate(&items[i.saturating_sub(buffer)..=i]);
            let right_end = (i + 1 + buffer).min(items.len() - 1);
            let right = aggregate(&items[i + 1..=right_end]);
            score(&left, &right)
        })
        .collect()
}

fn mean_std_dev(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

/// Linear-interpolated percentile (0..=100) of `values`
fn percentile_value(values: &[f32], pct: f32) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Byte offset just past the first `n` chars (or the end of `s`)
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// Split a trimmed sentence into pieces of at most `max_chars`, preferring whitespace
fn split_long(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = sentence.to_string();
    while rest.chars().count() > max_chars {
        match split_to_fit(&rest, max_chars) {
            Some((head, tail)) => {
                pieces.push(head);
                rest = tail;
            }
            None => break,
        }
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Take at most `capacity` chars from the front of `text`, cutting at the last
/// whitespace that fits (hard cut if there is none)
fn split_to_fit(text: &str, capacity: usize) -> Option<(String, String)> {
    if capacity == 0 {
        return None;
    }
    let limit = char_offset(text, capacity);
    if limit >= text.len() {
        return None;
    }
    // whitespace right at the limit also counts; it is dropped from both pieces
    let window = &text[..char_offset(text, capacity + 1)];
    let cut = window
        .rfind(char::is_whitespace)
        .filter(|&i| i > 0 && !text[..i].trim_end().is_empty())
        .unwrap_or(limit);

    let head = text[..cut].trim_end().to_string();
    let tail = text[cut..].trim_start().to_string();
    if head.is_empty() || tail.is_empty() {
        return None;
    }
    Some((head, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_chars: usize, max_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            min_chars,
            max_chars,
            ..ChunkingConfig::default()
        }
    }

    fn pages(texts: &[&str]) -> Vec<PageText> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| PageText::new(i as u32 + 1, *t))
            .collect()
    }

    #[test]
    fn test_rejects_inverted_band() {
        assert!(matches!(
            SemanticChunker::new(config(100, 50)),
            Err(Error::Chunking(_))
        ));
        assert!(SemanticChunker::new(config(0, 0)).is_err());
    }

    #[test]
    fn test_splits_on_topic_change_across_pages() {
        let chunker = SemanticChunker::new(config(20, 500)).unwrap();
        let outcome = chunker
            .chunk(
                "policy.pdf",
                &pages(&[
                    "Employees must file expenses within 30 days.",
                    "Travel requires manager approval.",
                ]),
            )
            .unwrap();

        assert_eq!(outcome.chunks.len(), 2);
        assert_eq!(outcome.chunks[0].content, "Employees must file expenses within 30 days.");
        assert_eq!(outcome.chunks[0].page_range, PageRange::single(1));
        assert_eq!(outcome.chunks[1].content, "Travel requires manager approval.");
        assert_eq!(outcome.chunks[1].id, "policy.pdf#00001");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_default_band_splits_short_topics() {
        let chunker = SemanticChunker::new(ChunkingConfig::default()).unwrap();
        let outcome = chunker
            .chunk(
                "policy.pdf",
                &pages(&[
                    "Employees must file expenses within 30 days.",
                    "Travel requires manager approval.",
                ]),
            )
            .unwrap();
        let contents: Vec<&str> = outcome.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "Employees must file expenses within 30 days.",
                "Travel requires manager approval.",
            ]
        );
    }

    #[test]
    fn test_related_sentences_stay_together() {
        let chunker = SemanticChunker::new(config(20, 500)).unwrap();
        let outcome = chunker
            .chunk(
                "doc.pdf",
                &pages(&["Expense reports list every expense. Each expense report needs receipts."]),
            )
            .unwrap();
        assert_eq!(outcome.chunks.len(), 1);
    }

    #[test]
    fn test_no_text_is_warning_not_error() {
        let chunker = SemanticChunker::new(ChunkingConfig::default()).unwrap();
        let outcome = chunker.chunk("scan.pdf", &pages(&["", "   "])).unwrap();
        assert!(outcome.chunks.is_empty());
        assert_eq!(outcome.warnings, vec![ChunkWarning::NoExtractableText]);
    }

    #[test]
    fn test_blank_pages_reported_and_ranges_kept() {
        let chunker = SemanticChunker::new(config(10, 500)).unwrap();
        let outcome = chunker
            .chunk("doc.pdf", &pages(&["First page text.", "", "Third page text."]))
            .unwrap();
        assert!(outcome
            .warnings
            .contains(&ChunkWarning::PagesWithoutText(vec![2])));
        let last = outcome.chunks.last().unwrap();
        assert_eq!(last.page_range.end, 3);
    }

    #[test]
    fn test_overlong_sentence_is_split_at_whitespace() {
        let chunker = SemanticChunker::new(config(5, 20)).unwrap();
        let sentences = chunker.sentences(&pages(&["alpha beta gamma delta epsilon zeta eta"]));
        assert!(sentences.iter().all(|s| s.text.chars().count() <= 20));
        let rejoined: Vec<&str> = sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(rejoined.join(" "), "alpha beta gamma delta epsilon zeta eta");
    }

    #[test]
    fn test_vector_count_mismatch() {
        let chunker = SemanticChunker::new(config(5, 100)).unwrap();
        let err = chunker
            .chunk_with_vectors("d.pdf", &pages(&["One. Two."]), &[vec![1.0]])
            .unwrap_err();
        assert!(matches!(err, Error::Chunking(_)));
    }

    #[test]
    fn test_embedding_signal_splits_on_orthogonal_vectors() {
        let chunker = SemanticChunker::new(config(5, 100)).unwrap();
        let outcome = chunker
            .chunk_with_vectors(
                "d.pdf",
                &pages(&["Cats purr. Cats nap. Stocks fell. Stocks rose."]),
                &[
                    vec![1.0, 0.0],
                    vec![1.0, 0.1],
                    vec![0.0, 1.0],
                    vec![0.1, 1.0],
                ],
            )
            .unwrap();
        let contents: Vec<&str> = outcome.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["Cats purr. Cats nap.", "Stocks fell. Stocks rose."]);
    }

    #[test]
    fn test_percentile_threshold() {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5];
        assert!((percentile_value(&values, 0.0) - 0.1).abs() < 1e-6);
        assert!((percentile_value(&values, 50.0) - 0.3).abs() < 1e-6);
        assert!((percentile_value(&values, 100.0) - 0.5).abs() < 1e-6);
    }
}
