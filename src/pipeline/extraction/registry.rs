use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::context::ExtractionContext;
use super::docx::DocxParser;
use super::pdf::PdfParser;
use super::pptx::PptxParser;
use super::spreadsheet::SpreadsheetParser;
use super::text::TextParser;
use super::types::DocumentParser;
use super::ExtractionError;

/// Builds a parser for one file. Returning `Box<dyn DocumentParser>` is what
/// makes a registered variant conform to the parser contract.
pub type ParserConstructor =
    fn(&Path, &Arc<ExtractionContext>) -> Result<Box<dyn DocumentParser>, ExtractionError>;

/// Built-in parser families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Pdf,
    WordProcessor,
    Spreadsheet,
    Presentation,
    PlainText,
}

impl ParserKind {
    pub fn constructor(self) -> ParserConstructor {
        match self {
            Self::Pdf => new_pdf,
            Self::WordProcessor => new_docx,
            Self::Spreadsheet => new_spreadsheet,
            Self::Presentation => new_pptx,
            Self::PlainText => new_text,
        }
    }
}

fn new_pdf(
    path: &Path,
    ctx: &Arc<ExtractionContext>,
) -> Result<Box<dyn DocumentParser>, ExtractionError> {
    Ok(Box::new(PdfParser::new(path, Arc::clone(ctx))?))
}

fn new_docx(
    path: &Path,
    _ctx: &Arc<ExtractionContext>,
) -> Result<Box<dyn DocumentParser>, ExtractionError> {
    Ok(Box::new(DocxParser::new(path)?))
}

fn new_spreadsheet(
    path: &Path,
    _ctx: &Arc<ExtractionContext>,
) -> Result<Box<dyn DocumentParser>, ExtractionError> {
    Ok(Box::new(SpreadsheetParser::new(path)?))
}

fn new_pptx(
    path: &Path,
    _ctx: &Arc<ExtractionContext>,
) -> Result<Box<dyn DocumentParser>, ExtractionError> {
    Ok(Box::new(PptxParser::new(path)?))
}

fn new_text(
    path: &Path,
    _ctx: &Arc<ExtractionContext>,
) -> Result<Box<dyn DocumentParser>, ExtractionError> {
    Ok(Box::new(TextParser::new(path)?))
}

/// Extension bindings installed by `ParserRegistry::with_defaults`.
pub const DEFAULT_BINDINGS: &[(&str, ParserKind)] = &[
    (".pdf", ParserKind::Pdf),
    (".docx", ParserKind::WordProcessor),
    (".doc", ParserKind::WordProcessor),
    (".xlsx", ParserKind::Spreadsheet),
    (".xls", ParserKind::Spreadsheet),
    (".csv", ParserKind::Spreadsheet),
    (".pptx", ParserKind::Presentation),
    (".ppt", ParserKind::Presentation),
    (".txt", ParserKind::PlainText),
    (".md", ParserKind::PlainText),
    (".py", ParserKind::PlainText),
    (".js", ParserKind::PlainText),
    (".java", ParserKind::PlainText),
    (".cpp", ParserKind::PlainText),
    (".c", ParserKind::PlainText),
    (".h", ParserKind::PlainText),
    (".json", ParserKind::PlainText),
    (".xml", ParserKind::PlainText),
    (".html", ParserKind::PlainText),
    (".css", ParserKind::PlainText),
];

/// Extension → parser constructor table.
///
/// Build once, register extra bindings, then share by reference.
pub struct ParserRegistry {
    context: Arc<ExtractionContext>,
    parsers: HashMap<String, ParserConstructor>,
}

impl ParserRegistry {
    /// An empty registry.
    pub fn new(context: Arc<ExtractionContext>) -> Self {
        Self {
            context,
            parsers: HashMap::new(),
        }
    }

    /// A registry seeded with every built-in binding.
    pub fn with_defaults(context: Arc<ExtractionContext>) -> Self {
        let mut registry = Self::new(context);
        for (ext, kind) in DEFAULT_BINDINGS {
            registry
                .parsers
                .insert((*ext).to_string(), kind.constructor());
        }
        registry
    }

    pub fn context(&self) -> &Arc<ExtractionContext> {
        &self.context
    }

    /// Select and construct the parser for `path` by its lower-cased extension.
    pub fn get_parser(&self, path: &Path) -> Result<Box<dyn DocumentParser>, ExtractionError> {
        let ext = extension_key(path);
        let constructor = self
            .parsers
            .get(&ext)
            .ok_or_else(|| ExtractionError::UnsupportedFormat(ext.clone()))?;

        if !path.exists() {
            return Err(ExtractionError::FileNotFound(path.to_path_buf()));
        }

        tracing::debug!(file = %path.display(), extension = %ext, "Dispatching parser");
        constructor(path, &self.context)
    }

    /// Bind `extension` to `constructor`, replacing any existing binding.
    pub fn register_parser(
        &mut self,
        extension: &str,
        constructor: ParserConstructor,
    ) -> Result<(), ExtractionError> {
        let key = normalize_extension(extension)?;
        if self.parsers.insert(key.clone(), constructor).is_some() {
            tracing::debug!(extension = %key, "Replaced parser binding");
        }
        Ok(())
    }

    /// Registered extensions, sorted.
    pub fn get_supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.parsers.keys().cloned().collect();
        exts.sort();
        exts
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.parsers.contains_key(&extension_key(path))
    }
}

fn extension_key(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn normalize_extension(extension: &str) -> Result<String, ExtractionError> {
    let trimmed = extension.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return Err(ExtractionError::InvalidExtension(extension.to_string()));
    }
    Ok(format!(".{}", trimmed.to_lowercase()))
}
