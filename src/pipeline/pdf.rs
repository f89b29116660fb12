//! PDF text collaborator.
//!
//! The pipeline and the upload step only need page counts and per-page text; both come from
//! [`PdfTextExtractor`]. The default implementation is backed by `lopdf`.

use crate::pipeline::types::PdfTextError;

/// Text read from a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfPage {
    /// 1-based page number.
    pub number: u32,
    /// Trimmed page text; `None` when the page could not be decoded.
    pub text: Option<String>,
}

impl PdfPage {
    /// Whether the page carries readable text rather than scanned images.
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(looks_like_text)
    }
}

/// Source of page counts and page text for raw PDF bytes.
pub trait PdfTextExtractor: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, pdf: &[u8]) -> Result<usize, PdfTextError>;

    /// Text of the first `max_pages` pages, in page order.
    fn extract_pages(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<PdfPage>, PdfTextError>;
}

/// [`PdfTextExtractor`] backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfTextExtractor;

impl PdfTextExtractor for LopdfTextExtractor {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, PdfTextError> {
        let document = load(pdf)?;
        Ok(document.get_pages().len())
    }

    fn extract_pages(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<PdfPage>, PdfTextError> {
        let document = load(pdf)?;
        let pages = document
            .get_pages()
            .into_keys()
            .take(max_pages)
            .map(|number| {
                let text = match document.extract_text(&[number]) {
                    Ok(text) => Some(text.trim().to_string()),
                    Err(error) => {
                        tracing::warn!(page = number, error = %error, "Failed to read PDF page");
                        None
                    }
                };
                PdfPage { number, text }
            })
            .collect();
        Ok(pages)
    }
}

fn load(pdf: &[u8]) -> Result<lopdf::Document, PdfTextError> {
    lopdf::Document::load_mem(pdf).map_err(|error| PdfTextError::Load(error.to_string()))
}

/// Render pages with `=== Page N ===` headers and placeholders for pages without text.
pub fn format_pages(pages: &[PdfPage]) -> String {
    pages
        .iter()
        .map(|page| {
            let body = match page.text.as_deref() {
                Some(text) if !text.is_empty() => text,
                Some(_) => "[This page appears to contain images or no readable text]",
                None => "[Could not read this page]",
            };
            format!("=== Page {} ===\n{body}", page.number)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Font decoding failures produced by some CID fonts.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Below this many characters the alphanumeric ratio is not checked.
const MIN_TOTAL_CHARS: usize = 50;

/// Minimum share of alphanumeric characters, in percent, for text to count as real.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Whether extracted text is real text rather than empty output or decoding noise.
pub fn looks_like_text(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return false;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    !(total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT)
}
