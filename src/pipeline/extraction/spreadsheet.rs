use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};

use super::ooxml::{open_package, CoreProperties};
use super::text::decode_text;
use super::types::{ensure_exists, DegradeReason, DocumentMetadata, DocumentParser, ExtractedText};
use super::ExtractionError;

/// Workbooks (.xlsx, .xls) via calamine and delimited text (.csv) via csv.
pub struct SpreadsheetParser {
    path: PathBuf,
    kind: SheetKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetKind {
    Workbook,
    Csv,
}

impl SpreadsheetParser {
    pub fn new(path: &Path) -> Result<Self, ExtractionError> {
        let path = ensure_exists(path)?;
        let is_csv = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        Ok(Self {
            path,
            kind: if is_csv { SheetKind::Csv } else { SheetKind::Workbook },
        })
    }

    fn sheet_name_for_csv(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::Error(e) => format!("#ERR:{e:?}"),
    }
}

/// One `[Sheet: name]` header per sheet, then tab-joined non-blank rows.
fn read_workbook(path: &Path) -> Result<String, ExtractionError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?;

    let mut lines = Vec::new();
    for sheet_name in workbook.sheet_names().to_vec() {
        lines.push(format!("[Sheet: {sheet_name}]"));
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ExtractionError::Spreadsheet(format!("sheet {sheet_name}: {e}")))?;
        for row in range.rows() {
            let row_text = row.iter().map(cell_text).collect::<Vec<_>>().join("\t");
            if !row_text.trim().is_empty() {
                lines.push(row_text);
            }
        }
    }
    Ok(lines.join("\n"))
}

fn read_csv(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path)?;
    let decoded = decode_text(&bytes);
    tracing::debug!(file = %path.display(), encoding = decoded.encoding.name(), "CSV decoded");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoded.text.as_bytes());

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?;
        let row_text = record.iter().collect::<Vec<_>>().join("\t");
        if !row_text.trim().is_empty() {
            lines.push(row_text);
        }
    }
    Ok(lines.join("\n"))
}

impl DocumentParser for SpreadsheetParser {
    fn label(&self) -> &'static str {
        "Excel Parser"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn extract_text(&self) -> ExtractedText {
        let result = match self.kind {
            SheetKind::Workbook => read_workbook(&self.path),
            SheetKind::Csv => read_csv(&self.path),
        };
        match result {
            Ok(text) => ExtractedText::content(text),
            Err(e) => ExtractedText::degraded(
                self.label(),
                DegradeReason::ExtractionFailure(e.to_string()),
                &self.path,
            ),
        }
    }

    fn extract_metadata(&self) -> DocumentMetadata {
        if self.kind == SheetKind::Csv {
            return DocumentMetadata {
                sheet_count: Some(1),
                sheet_names: vec![self.sheet_name_for_csv()],
                ..Default::default()
            };
        }

        let workbook = match open_workbook_auto(&self.path) {
            Ok(workbook) => workbook,
            Err(e) => return DocumentMetadata::from_error(e),
        };
        let sheet_names = workbook.sheet_names().to_vec();
        let mut meta = DocumentMetadata {
            sheet_count: Some(sheet_names.len()),
            sheet_names,
            ..Default::default()
        };

        // Legacy .xls carries no OOXML core part.
        if let Ok(mut package) = open_package(&self.path) {
            match CoreProperties::read(&mut package) {
                Ok(props) => props.apply_to(&mut meta),
                Err(e) => meta.error = Some(e.to_string()),
            }
        }
        meta
    }
}
