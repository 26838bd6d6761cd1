pub mod types;
pub mod context;
pub mod registry;
pub mod text;
pub mod spreadsheet;
pub mod ooxml;
pub mod docx;
pub mod pptx;
pub mod pdf;
pub mod pdfium;
pub mod ocr;

pub use types::*;
pub use context::*;
pub use registry::*;
pub use pdf::*;
pub use ocr::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No parser available for file extension: {0:?}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid file extension: {0:?}")]
    InvalidExtension(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDFium library not available: {0}")]
    PdfiumUnavailable(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF page {page} failed: {reason}")]
    PdfPage { page: usize, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Document archive error: {0}")]
    Archive(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Resource lock poisoned")]
    LockPoisoned,
}
