//! OCR engines for scanned PDF pages.
//!
//! Engines are not required to be thread-safe; `OcrPool` serializes access
//! so one engine instance can serve every parser sharing a context.

use std::sync::{Arc, Mutex};

use base64::Engine as _;

use super::types::OcrEngine;
use super::ExtractionError;
use crate::pipeline::structuring::types::VisionClient;

// ──────────────────────────────────────────────
// Pool
// ──────────────────────────────────────────────

/// One OCR engine shared by every parser, serialized behind a mutex.
pub struct OcrPool {
    engine: Mutex<Box<dyn OcrEngine>>,
}

impl OcrPool {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    pub fn recognize(&self, image_png: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let engine = self.engine.lock().map_err(|_| ExtractionError::LockPoisoned)?;
        engine.recognize(image_png)
    }

    pub fn engine_name(&self) -> Result<String, ExtractionError> {
        let engine = self.engine.lock().map_err(|_| ExtractionError::LockPoisoned)?;
        Ok(engine.name().to_string())
    }
}

// ──────────────────────────────────────────────
// Ollama vision model
// ──────────────────────────────────────────────

const OCR_SYSTEM_PROMPT: &str = "\
You are an OCR engine. Transcribe the text visible in the image exactly as written. \
Do not translate, summarize, or describe the image.";

const OCR_USER_PROMPT: &str = "\
Extract all visible text from this page image. \
Output plain text only, one line of the page per line, in reading order. \
If the page has no text, output nothing.";

/// OCR backed by an Ollama vision model.
pub struct OllamaVisionOcr {
    vision_client: Arc<dyn VisionClient>,
    model_name: String,
}

impl OllamaVisionOcr {
    pub fn new(vision_client: Arc<dyn VisionClient>, model_name: String) -> Self {
        Self {
            vision_client,
            model_name,
        }
    }
}

impl OcrEngine for OllamaVisionOcr {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn recognize(&self, image_png: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let _span = tracing::info_span!(
            "vision_ocr",
            model = %self.model_name,
            image_size = image_png.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let images = vec![base64::engine::general_purpose::STANDARD.encode(image_png)];
        let response = self
            .vision_client
            .chat_with_images(&self.model_name, OCR_USER_PROMPT, &images, Some(OCR_SYSTEM_PROMPT))
            .map_err(|e| ExtractionError::OcrProcessing(format!("vision OCR failed: {e}")))?;

        let lines = split_lines(&response);
        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            lines = lines.len(),
            "Vision OCR complete"
        );
        Ok(lines)
    }
}

fn split_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// ──────────────────────────────────────────────
// Mock
// ──────────────────────────────────────────────

/// Mock OCR engine returning the same lines for every image.
pub struct MockOcrEngine {
    lines: Vec<String>,
    fail: bool,
}

impl MockOcrEngine {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines, fail: false }
    }

    /// An engine whose every call fails.
    pub fn failing() -> Self {
        Self {
            lines: Vec::new(),
            fail: true,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn name(&self) -> &str {
        "mock-ocr"
    }

    fn recognize(&self, _image_png: &[u8]) -> Result<Vec<String>, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::OcrProcessing("mock failure".into()));
        }
        Ok(self.lines.clone())
    }
}
