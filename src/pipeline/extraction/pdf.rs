//! Hybrid PDF extraction: direct text-layer sampling with OCR escalation
//! for scanned documents.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lopdf::{Document, Object};

use super::context::ExtractionContext;
use super::ocr::OcrPool;
use super::pdfium::extract_with_pdfium;
use super::types::{
    ensure_exists, DegradeReason, DocumentMetadata, DocumentParser, ExtractedText, PdfPageSource,
};
use super::ExtractionError;

/// Leading pages direct-extracted to decide whether the document is scanned.
pub const SAMPLE_PAGES: usize = 5;
/// Stripped sample length (characters) below which OCR runs.
pub const MIN_TEXT_LENGTH: usize = 50;
/// Upper bound on OCR'd pages per document.
pub const MAX_OCR_PAGES: usize = 7;
/// Rasterization scale for OCR input.
pub const OCR_SCALE: f32 = 2.0;

/// Result of `hybrid_extract`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridOutcome {
    pub text: String,
    pub total_pages: usize,
    /// Escalation threshold was hit (whether or not an engine was available).
    pub ocr_invoked: bool,
    /// Pages that produced OCR text.
    pub ocr_pages: usize,
}

/// True when the sampled text is too thin to trust.
pub fn needs_ocr(sampled_text: &str, total_pages: usize) -> bool {
    total_pages > 0 && sampled_text.trim().chars().count() < MIN_TEXT_LENGTH
}

/// Run the sampling / escalation / tail-append algorithm over `pages`.
pub fn hybrid_extract(
    pages: &dyn PdfPageSource,
    ocr: Option<&OcrPool>,
    cancel: Option<&AtomicBool>,
) -> Result<HybridOutcome, ExtractionError> {
    let total_pages = pages.page_count();
    let mut outcome = HybridOutcome {
        total_pages,
        ..Default::default()
    };

    let mut sampled = Vec::new();
    for index in 0..total_pages.min(SAMPLE_PAGES) {
        let text = pages.page_text(index)?;
        if !text.is_empty() {
            sampled.push(text);
        }
    }
    outcome.text = sampled.join("\n");

    if needs_ocr(&outcome.text, total_pages) {
        outcome.ocr_invoked = true;
        tracing::info!(
            total_pages,
            sampled_chars = outcome.text.trim().chars().count(),
            "Sampled text below threshold, escalating to OCR"
        );
        match ocr {
            Some(pool) => {
                let (ocr_text, ocr_pages) = ocr_leading_pages(pages, pool, cancel);
                outcome.ocr_pages = ocr_pages;
                if !ocr_text.is_empty() {
                    outcome.text = ocr_text;
                }
            }
            None => tracing::warn!("No OCR engine configured, keeping sampled text"),
        }
    }

    for index in SAMPLE_PAGES..total_pages {
        let text = pages.page_text(index)?;
        if !text.is_empty() {
            outcome.text.push('\n');
            outcome.text.push_str(&text);
        }
    }

    Ok(outcome)
}

/// OCR the first `MAX_OCR_PAGES` pages. A page that fails to render or
/// recognise is logged and skipped.
fn ocr_leading_pages(
    pages: &dyn PdfPageSource,
    pool: &OcrPool,
    cancel: Option<&AtomicBool>,
) -> (String, usize) {
    let mut parts = Vec::new();

    for index in 0..pages.page_count().min(MAX_OCR_PAGES) {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            tracing::info!(page = index + 1, "OCR cancelled");
            break;
        }

        let png = match pages.render_page(index, OCR_SCALE) {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(page = index + 1, error = %e, "Page render failed, skipping");
                continue;
            }
        };

        match pool.recognize(&png) {
            Ok(lines) if !lines.is_empty() => {
                parts.push(format!("[Page {}]\n{}", index + 1, lines.join("\n")));
            }
            Ok(_) => tracing::debug!(page = index + 1, "OCR found no text"),
            Err(e) => tracing::warn!(page = index + 1, error = %e, "OCR failed, skipping page"),
        }
    }

    let count = parts.len();
    (parts.join("\n\n"), count)
}

/// Direct-extraction-only page source backed by pre-extracted page texts.
/// Used for the pure-Rust fallback, which cannot rasterize.
pub struct TextOnlyPages {
    pages: Vec<String>,
}

impl TextOnlyPages {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    /// Split a PDF into page texts with `pdf-extract`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExtractionError> {
        // pdf-extract can panic on malformed input.
        let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes));
        match result {
            Ok(Ok(pages)) => Ok(Self::new(pages)),
            Ok(Err(e)) => Err(ExtractionError::PdfParsing(e.to_string())),
            Err(_) => Err(ExtractionError::PdfParsing(
                "text extraction panicked (malformed PDF)".into(),
            )),
        }
    }
}

impl PdfPageSource for TextOnlyPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String, ExtractionError> {
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| ExtractionError::PdfPage {
                page: index + 1,
                reason: format!("out of range (document has {} pages)", self.pages.len()),
            })
    }

    fn render_page(&self, index: usize, _scale: f32) -> Result<Vec<u8>, ExtractionError> {
        Err(ExtractionError::PdfPage {
            page: index + 1,
            reason: "rasterization requires PDFium".into(),
        })
    }
}

/// PDF documents.
pub struct PdfParser {
    path: PathBuf,
    context: Arc<ExtractionContext>,
}

impl PdfParser {
    pub fn new(path: &Path, context: Arc<ExtractionContext>) -> Result<Self, ExtractionError> {
        Ok(Self {
            path: ensure_exists(path)?,
            context,
        })
    }

    /// PDFium with OCR when available, otherwise the pure-Rust text backend.
    pub fn extract(&self) -> Result<HybridOutcome, DegradeReason> {
        let caps = self.context.capabilities();
        let cancel = Some(self.context.cancel_flag());

        if caps.pdfium {
            match extract_with_pdfium(&self.path, self.context.ocr_pool(), cancel) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => tracing::warn!(
                    file = %self.path.display(),
                    error = %e,
                    "PDFium extraction failed, trying pure-Rust backend"
                ),
            }
        }

        let fallback = std::fs::read(&self.path)
            .map_err(ExtractionError::from)
            .and_then(|bytes| TextOnlyPages::from_bytes(&bytes))
            .and_then(|pages| hybrid_extract(&pages, None, cancel));

        fallback.map_err(|e| {
            tracing::warn!(file = %self.path.display(), error = %e, "Fallback PDF backend failed");
            let suffix = if caps.pdfium { "" } else { " (PDFium not available)" };
            DegradeReason::ExtractionFailure(format!("{e}{suffix}"))
        })
    }
}

impl DocumentParser for PdfParser {
    fn label(&self) -> &'static str {
        "PDF Parser"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn extract_text(&self) -> ExtractedText {
        match self.extract() {
            Ok(outcome) => {
                tracing::info!(
                    file = %self.path.display(),
                    pages = outcome.total_pages,
                    ocr_invoked = outcome.ocr_invoked,
                    ocr_pages = outcome.ocr_pages,
                    chars = outcome.text.chars().count(),
                    "PDF extracted"
                );
                ExtractedText::content(outcome.text)
            }
            Err(reason) => ExtractedText::degraded(self.label(), reason, &self.path),
        }
    }

    fn extract_metadata(&self) -> DocumentMetadata {
        match Document::load(&self.path) {
            Ok(doc) => read_info_dictionary(&doc),
            Err(e) => DocumentMetadata::from_error(ExtractionError::PdfParsing(e.to_string())),
        }
    }
}

fn read_info_dictionary(doc: &Document) -> DocumentMetadata {
    let mut meta = DocumentMetadata {
        page_count: Some(doc.get_pages().len()),
        ..Default::default()
    };

    let info = doc.trailer.get(b"Info").ok().and_then(|obj| match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    });
    let Some(Object::Dictionary(info)) = info else {
        tracing::debug!("PDF has no Info dictionary");
        return meta;
    };

    let text = |key: &[u8]| match info.get(key) {
        Ok(Object::String(bytes, _)) => Some(decode_pdf_string(bytes)),
        _ => None,
    };
    meta.title = text(b"Title");
    meta.author = text(b"Author");
    meta.subject = text(b"Subject");
    meta.keywords = text(b"Keywords");
    meta.creator = text(b"Creator");
    meta.producer = text(b"Producer");
    meta.created_date = text(b"CreationDate");
    meta.modified_date = text(b"ModDate");
    meta
}

/// PDF text strings: UTF-16BE with BOM, else UTF-8, else Latin-1.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
