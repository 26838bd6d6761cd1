//! PDFium backend: per-page text and page rasterization for OCR.
//!
//! The upstream `Pdfium` handle is `!Send`, so it is bound per document.
//! The OS caches `dlopen`/`LoadLibrary`, which makes repeat binds cheap.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::ocr::OcrPool;
use super::pdf::{hybrid_extract, HybridOutcome};
use super::types::PdfPageSource;
use super::ExtractionError;

/// Cap on either side of a rendered page image.
const MAX_DIMENSION_PX: u32 = 4096;

/// Bind the PDFium shared library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to the library file)
/// 2. Alongside the running executable, then `<exe_dir>/pdfium/{bin,lib}`
///    and `<exe_dir>/../lib`
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::PdfiumUnavailable(format!("failed to load {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let candidates = [
            exe_dir.clone(),
            exe_dir.join("pdfium").join("bin"),
            exe_dir.join("pdfium").join("lib"),
            exe_dir.join("..").join("lib"),
        ];
        for dir in &candidates {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %dir.display(), "Loaded PDFium from candidate directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::PdfiumUnavailable(format!(
            "library not found, set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Whether the PDFium library can be bound in this process.
pub fn pdfium_available() -> bool {
    match load_pdfium() {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "PDFium not available");
            false
        }
    }
}

fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfParsing(format!("document is encrypted: {msg}"))
    } else {
        ExtractionError::PdfParsing(format!("failed to load PDF: {msg}"))
    }
}

/// Pixel dimensions for a page rendered at `scale` pixels per point.
/// Both sides are clamped to `[1, MAX_DIMENSION_PX]`, keeping the aspect ratio.
fn compute_render_dimensions(width_points: f32, height_points: f32, scale: f32) -> (u32, u32) {
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

/// A loaded document exposed through `PdfPageSource`.
pub struct PdfiumPages<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumPages<'a> {
    pub fn new(document: PdfDocument<'a>) -> Self {
        Self { document }
    }

    fn page(&self, index: usize) -> Result<PdfPage<'_>, ExtractionError> {
        let pages = self.document.pages();
        let page_index = u16::try_from(index).map_err(|_| ExtractionError::PdfPage {
            page: index + 1,
            reason: format!("page index {index} exceeds u16 maximum"),
        })?;
        pages.get(page_index).map_err(|_| ExtractionError::PdfPage {
            page: index + 1,
            reason: format!("out of range (document has {} pages)", pages.len()),
        })
    }
}

impl PdfPageSource for PdfiumPages<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_text(&self, index: usize) -> Result<String, ExtractionError> {
        let page = self.page(index)?;
        page.text()
            .map(|text| text.all())
            .map_err(|e| ExtractionError::PdfPage {
                page: index + 1,
                reason: format!("text layer unreadable: {e}"),
            })
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<Vec<u8>, ExtractionError> {
        let page = self.page(index)?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, scale);

        let uncapped_w = (width_points * scale) as u32;
        let uncapped_h = (height_points * scale) as u32;
        if target_w != uncapped_w || target_h != uncapped_h {
            warn!(
                page = index + 1,
                raw_width = uncapped_w,
                raw_height = uncapped_h,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped to {MAX_DIMENSION_PX}px",
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ExtractionError::PdfPage {
                page: index + 1,
                reason: format!("rendering failed: {e}"),
            })?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
        let png_bytes = cursor.into_inner();

        debug!(
            page = index + 1,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page to PNG"
        );
        Ok(png_bytes)
    }
}

/// Hybrid extraction over a PDFium-loaded document.
pub fn extract_with_pdfium(
    path: &Path,
    ocr: Option<&OcrPool>,
    cancel: Option<&AtomicBool>,
) -> Result<HybridOutcome, ExtractionError> {
    let pdfium = load_pdfium()?;
    let bytes = std::fs::read(path)?;
    let document = pdfium
        .load_pdf_from_byte_slice(&bytes, None)
        .map_err(map_load_error)?;

    let pages = PdfiumPages::new(document);
    let outcome = hybrid_extract(&pages, ocr, cancel);
    outcome
}
