use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::ocr::{OcrPool, OllamaVisionOcr};
use super::pdfium::pdfium_available;
use crate::config::AppConfig;
use crate::pipeline::structuring::OllamaClient;

/// Optional backends, probed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// The PDFium shared library could be bound.
    pub pdfium: bool,
    /// An OCR engine is configured and reachable.
    pub ocr: bool,
}

/// Runtime resources shared by every parser built from one registry.
pub struct ExtractionContext {
    capabilities: Capabilities,
    ocr: Option<OcrPool>,
    cancel: Arc<AtomicBool>,
}

impl ExtractionContext {
    pub fn new(capabilities: Capabilities, ocr: Option<OcrPool>) -> Self {
        let capabilities = Capabilities {
            ocr: capabilities.ocr && ocr.is_some(),
            ..capabilities
        };
        Self {
            capabilities,
            ocr,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// No PDFium, no OCR: every PDF goes through the pure-Rust backend.
    pub fn text_only() -> Self {
        Self::new(Capabilities::default(), None)
    }

    /// Probe PDFium and build the OCR engine described by `config`.
    pub fn detect(config: &AppConfig) -> Self {
        let pdfium = pdfium_available();
        let ocr = config
            .ocr_model
            .as_deref()
            .and_then(|model| build_vision_ocr(config, model));

        let capabilities = Capabilities {
            pdfium,
            ocr: ocr.is_some(),
        };
        tracing::info!(
            pdfium = capabilities.pdfium,
            ocr = capabilities.ocr,
            "Extraction capabilities resolved"
        );
        Self::new(capabilities, ocr)
    }

    /// Share an external cancellation flag (checked between OCR pages).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn ocr_pool(&self) -> Option<&OcrPool> {
        self.ocr.as_ref()
    }

    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

impl Default for ExtractionContext {
    fn default() -> Self {
        Self::text_only()
    }
}

fn build_vision_ocr(config: &AppConfig, model: &str) -> Option<OcrPool> {
    let client = match OllamaClient::new(&config.ollama_url, config.timeout_secs) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot build Ollama client for OCR");
            return None;
        }
    };

    match client.is_model_available(model) {
        Ok(true) => {
            let engine = OllamaVisionOcr::new(Arc::new(client), model.to_string());
            Some(OcrPool::new(Box::new(engine)))
        }
        Ok(false) => {
            tracing::warn!(model, "OCR model is not installed, scanned PDFs will not be OCR'd");
            None
        }
        Err(e) => {
            tracing::warn!(model, error = %e, "OCR backend unreachable, scanned PDFs will not be OCR'd");
            None
        }
    }
}
