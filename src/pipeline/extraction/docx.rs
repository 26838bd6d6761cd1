use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ooxml::{open_package, read_part, CoreProperties};
use super::types::{ensure_exists, DegradeReason, DocumentMetadata, DocumentParser, ExtractedText};
use super::ExtractionError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Word-processor documents (.docx). Legacy binary .doc files are routed
/// here as well and degrade because they are not zip packages.
pub struct DocxParser {
    path: PathBuf,
}

impl DocxParser {
    pub fn new(path: &Path) -> Result<Self, ExtractionError> {
        Ok(Self {
            path: ensure_exists(path)?,
        })
    }

    fn read_body(&self) -> Result<DocxBody, ExtractionError> {
        let mut package = open_package(&self.path)?;
        let xml = read_part(&mut package, DOCUMENT_PART)?;
        parse_document_xml(&xml)
    }
}

/// Body text split the way it is emitted: top-level paragraphs, then table cells.
#[derive(Debug, Default, PartialEq)]
pub struct DocxBody {
    /// Every top-level paragraph, blank ones included.
    pub paragraphs: Vec<String>,
    /// Cell texts in document order; a cell's paragraphs are joined with `\n`.
    pub cells: Vec<String>,
}

impl DocxBody {
    pub fn to_text(&self) -> String {
        self.paragraphs
            .iter()
            .chain(self.cells.iter())
            .filter(|s| !s.trim().is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Default)]
struct BodyWalker {
    body: DocxBody,
    /// Open table cells, innermost last.
    cells: Vec<Option<String>>,
    paragraph: Option<String>,
    in_run: bool,
    in_text: bool,
    /// Element depth inside a text box; its paragraphs are not body text.
    skip_depth: usize,
}

impl BodyWalker {
    fn start(&mut self, e: &BytesStart<'_>) {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return;
        }
        match e.local_name().as_ref() {
            b"txbxContent" => self.skip_depth = 1,
            b"tc" => self.cells.push(None),
            b"p" => self.paragraph = Some(String::new()),
            b"r" => self.in_run = true,
            b"t" => self.in_text = true,
            _ => self.empty(e),
        }
    }

    /// Run-level breaks. Tab stops in paragraph properties are not runs.
    fn empty(&mut self, e: &BytesStart<'_>) {
        if self.skip_depth > 0 {
            return;
        }
        if e.local_name().as_ref() == b"p" {
            self.paragraph = Some(String::new());
            self.end(b"p");
            return;
        }
        if !self.in_run {
            return;
        }
        let Some(paragraph) = self.paragraph.as_mut() else {
            return;
        };
        match e.local_name().as_ref() {
            b"tab" => paragraph.push('\t'),
            b"br" | b"cr" => paragraph.push('\n'),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text && self.skip_depth == 0 {
            if let Some(paragraph) = self.paragraph.as_mut() {
                paragraph.push_str(text);
            }
        }
    }

    fn end(&mut self, local_name: &[u8]) {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }
        match local_name {
            b"t" => self.in_text = false,
            b"r" => self.in_run = false,
            b"p" => {
                let Some(paragraph) = self.paragraph.take() else {
                    return;
                };
                match self.cells.last_mut() {
                    Some(Some(cell)) => {
                        cell.push('\n');
                        cell.push_str(&paragraph);
                    }
                    Some(slot) => *slot = Some(paragraph),
                    None => self.body.paragraphs.push(paragraph),
                }
            }
            b"tc" => {
                if let Some(cell) = self.cells.pop() {
                    self.body.cells.push(cell.unwrap_or_default());
                }
            }
            _ => {}
        }
    }
}

pub fn parse_document_xml(xml: &str) -> Result<DocxBody, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut walker = BodyWalker::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => walker.start(&e),
            Ok(Event::Empty(e)) => walker.empty(&e),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| ExtractionError::Archive(format!("bad text in {DOCUMENT_PART}: {e}")))?;
                walker.text(&text);
            }
            Ok(Event::End(e)) => walker.end(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Archive(format!(
                    "malformed {DOCUMENT_PART} at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(walker.body)
}

impl DocumentParser for DocxParser {
    fn label(&self) -> &'static str {
        "DOCX Parser"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn extract_text(&self) -> ExtractedText {
        match self.read_body() {
            Ok(body) => ExtractedText::content(body.to_text()),
            Err(e) => ExtractedText::degraded(
                self.label(),
                DegradeReason::ExtractionFailure(e.to_string()),
                &self.path,
            ),
        }
    }

    fn extract_metadata(&self) -> DocumentMetadata {
        let result = (|| -> Result<DocumentMetadata, ExtractionError> {
            let mut package = open_package(&self.path)?;
            let body = parse_document_xml(&read_part(&mut package, DOCUMENT_PART)?)?;

            let mut meta = DocumentMetadata {
                paragraph_count: Some(body.paragraphs.len()),
                word_count: Some(body.to_text().split_whitespace().count()),
                ..Default::default()
            };
            CoreProperties::read(&mut package)?.apply_to(&mut meta);
            Ok(meta)
        })();

        result.unwrap_or_else(DocumentMetadata::from_error)
    }
}
