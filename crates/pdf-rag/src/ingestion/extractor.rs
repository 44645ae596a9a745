//! PDF text extraction, one entry per page

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, Result};

/// PDF header may appear anywhere in the first KiB
const HEADER_WINDOW: usize = 1024;

/// Why a page contributed no text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PageIssue {
    /// Page decoded fine but holds no text (scanned image, blank page)
    NoText,
    /// Page content stream could not be decoded
    Unreadable(String),
}

/// Text content of a single page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageText {
    /// Page number (1-indexed)
    pub number: u32,
    /// Cleaned text, empty when `issue` is set
    pub text: String,
    /// Set when the page yielded no text
    pub issue: Option<PageIssue>,
}

impl PageText {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let issue = text.trim().is_empty().then_some(PageIssue::NoText);
        Self {
            number,
            text,
            issue,
        }
    }

    fn unreadable(number: u32, reason: String) -> Self {
        Self {
            number,
            text: String::new(),
            issue: Some(PageIssue::Unreadable(reason)),
        }
    }
}

/// Every page of a PDF, in page order
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDocument {
    pub pages: Vec<PageText>,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether any page produced text
    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|p| !p.text.trim().is_empty())
    }

    /// Numbers of the pages that yielded no text
    pub fn empty_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|p| p.issue.is_some())
            .map(|p| p.number)
            .collect()
    }
}

/// Extracts per-page text from PDF bytes with lopdf
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor {
    password: String,
}

impl PdfExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            password: config.password.clone(),
        }
    }

    /// Extract every page; pure and CPU-bound
    pub fn extract(&self, data: &[u8]) -> Result<ExtractedDocument> {
        if !has_pdf_header(data) {
            return Err(ExtractionError::NotPdf.into());
        }

        let mut doc = lopdf::Document::load_mem(data).map_err(|e| {
            if contains_encrypt_marker(data) {
                ExtractionError::Encrypted
            } else {
                ExtractionError::Malformed(e.to_string())
            }
        })?;

        if doc.is_encrypted() {
            doc.decrypt(self.password.as_str()).map_err(|e| {
                tracing::debug!("Decryption failed: {}", e);
                ExtractionError::Encrypted
            })?;
        }

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(ExtractionError::Malformed("document has no pages".to_string()).into());
        }

        let pages = page_numbers
            .into_iter()
            .map(|number| match doc.extract_text(&[number]) {
                Ok(raw) => PageText::new(number, cleanup_pdf_text(&raw)),
                Err(e) => {
                    tracing::warn!("Could not extract text from page {}: {}", number, e);
                    PageText::unreadable(number, e.to_string())
                }
            })
            .collect::<Vec<_>>();

        let extracted = ExtractedDocument { pages };
        let empty = extracted.empty_pages();
        if !empty.is_empty() {
            tracing::info!(
                pages = extracted.page_count(),
                "{} page(s) without extractable text: {:?}",
                empty.len(),
                empty
            );
        }

        Ok(extracted)
    }
}

fn has_pdf_header(data: &[u8]) -> bool {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn contains_encrypt_marker(data: &[u8]) -> bool {
    data.windows(8).any(|w| w == b"/Encrypt")
}

fn horizontal_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\u{00A0}\u{2002}\u{2003}\u{2009}]+").expect("Invalid regex"))
}

/// Normalize typographic characters and whitespace in extracted text
pub fn cleanup_pdf_text(text: &str) -> String {
    let replaced = text
        .replace('\0', "")
        .replace('\u{2010}', "-")
        .replace('\u{2011}', "-")
        .replace('\u{2013}', "-")
        .replace('\u{2014}', "--")
        .replace('\u{2212}', "-")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2022}', "* ")
        .replace('\u{2026}', "...")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl");

    replaced
        .lines()
        .map(|line| horizontal_space().replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
