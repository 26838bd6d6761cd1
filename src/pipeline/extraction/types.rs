use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ExtractionError;

/// Marker appended to summaries cut at `max_length`.
pub const SUMMARY_ELLIPSIS: &str = "...";

/// Filesystem facts about a single input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub stem: String,
    /// Extension including the leading dot (`.pdf`), empty when absent.
    pub extension: String,
    pub size: u64,
    /// Not every platform records creation time.
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub path: PathBuf,
}

impl FileInfo {
    /// Read stat data for `path`.
    pub fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let metadata = std::fs::metadata(path)?;
        let absolute = std::path::absolute(path)?;

        Ok(Self {
            name: file_name_lossy(path),
            stem: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
            size: metadata.len(),
            created: metadata.created().ok().map(DateTime::<Utc>::from),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            path: absolute,
        })
    }
}

/// Why a parser could not produce real content.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradeReason {
    /// A backend needed for this format is not available at runtime.
    #[error("Cannot extract text: {0} not available")]
    MissingDependency(String),

    /// Corrupt file, decode error, or backend failure.
    #[error("Error extracting text: {0}")]
    ExtractionFailure(String),
}

/// Outcome of `extract_text`: real content, or a degraded placeholder that
/// still carries a human-readable diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractedText {
    Content {
        text: String,
    },
    Degraded {
        reason: DegradeReason,
        diagnostic: String,
    },
}

impl ExtractedText {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Build a degraded result whose diagnostic names the parser, the reason and the file.
    pub fn degraded(parser_label: &str, reason: DegradeReason, path: &Path) -> Self {
        let diagnostic = format!("[{parser_label}] {reason}\nFile: {}", file_name_lossy(path));
        tracing::warn!(
            parser = parser_label,
            file = %path.display(),
            reason = %reason,
            "Extraction degraded"
        );
        Self::Degraded { reason, diagnostic }
    }

    /// Content text, or the diagnostic for degraded results.
    pub fn text(&self) -> &str {
        match self {
            Self::Content { text } => text,
            Self::Degraded { diagnostic, .. } => diagnostic,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Content { text } => text,
            Self::Degraded { diagnostic, .. } => diagnostic,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn degrade_reason(&self) -> Option<&DegradeReason> {
        match self {
            Self::Content { .. } => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Document metadata. Every field is optional because each format exposes a
/// different subset. Extraction failures are recorded in `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sheet_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraph_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentMetadata {
    /// Metadata carrying only an error message.
    pub fn from_error(error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Capability set shared by every format parser.
pub trait DocumentParser: Send {
    /// Short label used in diagnostics, e.g. `"PDF Parser"`.
    fn label(&self) -> &'static str;

    fn path(&self) -> &Path;

    fn extract_text(&self) -> ExtractedText;

    fn extract_metadata(&self) -> DocumentMetadata;

    /// `extract_text` cut to `max_length` characters, with an ellipsis when cut.
    fn extract_summary(&self, max_length: usize) -> String {
        truncate_summary(self.extract_text().text(), max_length)
    }

    fn get_file_info(&self) -> Result<FileInfo, ExtractionError> {
        FileInfo::from_path(self.path())
    }
}

/// Truncate at a character (not byte) boundary.
pub fn truncate_summary(text: &str, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{SUMMARY_ELLIPSIS}", &text[..cut]),
    }
}

/// Fail with `FileNotFound` unless `path` exists.
pub fn ensure_exists(path: &Path) -> Result<PathBuf, ExtractionError> {
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(ExtractionError::FileNotFound(path.to_path_buf()))
    }
}

pub(crate) fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Page-level access to an opened PDF (allows mocking for tests).
pub trait PdfPageSource {
    fn page_count(&self) -> usize;

    /// Direct text-layer extraction for a 0-based page index.
    fn page_text(&self, index: usize) -> Result<String, ExtractionError>;

    /// Rasterize a 0-based page at `scale` × its natural size, as PNG bytes.
    fn render_page(&self, index: usize, scale: f32) -> Result<Vec<u8>, ExtractionError>;
}

/// OCR engine abstraction (allows mocking for tests).
pub trait OcrEngine: Send {
    fn name(&self) -> &str;

    /// Recognise text lines in a PNG image, in the engine's reading order.
    fn recognize(&self, image_png: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_shorter_than_limit_is_unchanged() {
        assert_eq!(truncate_summary("short", 10), "short");
        assert_eq!(truncate_summary("exact", 5), "exact");
    }

    #[test]
    fn summary_truncates_with_ellipsis() {
        assert_eq!(truncate_summary("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn summary_counts_characters_not_bytes() {
        let text = "年度财务报告第一季度";
        let summary = truncate_summary(text, 4);
        assert_eq!(summary, "年度财务...");
    }

    #[test]
    fn degraded_diagnostic_names_parser_reason_and_file() {
        let result = ExtractedText::degraded(
            "DOCX Parser",
            DegradeReason::ExtractionFailure("not a zip archive".into()),
            Path::new("/tmp/legacy.doc"),
        );
        assert!(result.is_degraded());
        let text = result.text();
        assert!(text.starts_with("[DOCX Parser]"));
        assert!(text.contains("not a zip archive"));
        assert!(text.contains("File: legacy.doc"));
    }

    #[test]
    fn content_is_not_degraded() {
        let result = ExtractedText::content("");
        assert!(!result.is_degraded());
        assert_eq!(result.degrade_reason(), None);
        assert_eq!(result.text(), "");
    }

    #[test]
    fn file_info_reads_stat_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report_2024.txt");
        std::fs::write(&path, "hello").unwrap();

        let info = FileInfo::from_path(&path).unwrap();
        assert_eq!(info.name, "report_2024.txt");
        assert_eq!(info.stem, "report_2024");
        assert_eq!(info.extension, ".txt");
        assert_eq!(info.size, 5);
        assert!(info.path.is_absolute());
        assert!(info.modified.is_some());
    }

    #[test]
    fn ensure_exists_rejects_missing_path() {
        let err = ensure_exists(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::FileNotFound(_)));
    }

    #[test]
    fn metadata_error_constructor() {
        let meta = DocumentMetadata::from_error("boom");
        assert_eq!(meta.error.as_deref(), Some("boom"));
        assert!(meta.title.is_none());
    }
}
