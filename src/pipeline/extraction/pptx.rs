use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ooxml::{open_package, read_optional_part, read_part, CoreProperties, Package};
use super::types::{ensure_exists, DegradeReason, DocumentMetadata, DocumentParser, ExtractedText};
use super::ExtractionError;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PART: &str = "ppt/_rels/presentation.xml.rels";

/// Presentations (.pptx). Legacy .ppt files degrade.
pub struct PptxParser {
    path: PathBuf,
}

impl PptxParser {
    pub fn new(path: &Path) -> Result<Self, ExtractionError> {
        Ok(Self {
            path: ensure_exists(path)?,
        })
    }

    fn read_slides(&self) -> Result<Vec<Vec<String>>, ExtractionError> {
        let mut package = open_package(&self.path)?;
        let parts = slide_parts(&mut package)?;
        parts
            .iter()
            .map(|part| parse_slide_xml(&read_part(&mut package, part)?))
            .collect()
    }
}

fn attribute(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_error(part: &str, e: quick_xml::Error) -> ExtractionError {
    ExtractionError::Archive(format!("malformed {part}: {e}"))
}

/// Slide part names in presentation order.
///
/// The order comes from `p:sldIdLst` resolved through the presentation
/// relationships. Packages missing either part fall back to numeric order of
/// `ppt/slides/slideN.xml`.
pub fn slide_parts(package: &mut Package) -> Result<Vec<String>, ExtractionError> {
    let presentation = read_optional_part(package, PRESENTATION_PART)?;
    let rels = read_optional_part(package, PRESENTATION_RELS_PART)?;

    if let (Some(presentation), Some(rels)) = (presentation, rels) {
        let targets = relationship_targets(&rels)?;
        let ordered: Vec<String> = slide_relationship_ids(&presentation)?
            .iter()
            .filter_map(|id| targets.get(id))
            .map(|target| resolve_target(target))
            .collect();
        if !ordered.is_empty() {
            return Ok(ordered);
        }
    }

    let mut numbered: Vec<(u32, String)> = package
        .file_names()
        .filter_map(|name| {
            let n = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    numbered.sort();
    Ok(numbered.into_iter().map(|(_, name)| name).collect())
}

fn slide_relationship_ids(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"sldId" => {
                if let Some(id) = relationship_id(&e) {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(PRESENTATION_PART, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(ids)
}

/// `p:sldId` carries both a numeric `id` and the relationship `r:id`; only the latter is wanted.
fn relationship_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn relationship_targets(xml: &str) -> Result<HashMap<String, String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let is_slide = attribute(&e, b"Type").is_some_and(|t| t.ends_with("/slide"));
                if let (true, Some(id), Some(target)) =
                    (is_slide, attribute(&e, b"Id"), attribute(&e, b"Target"))
                {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(PRESENTATION_RELS_PART, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{target}"),
    }
}

#[derive(Default)]
struct SlideWalker {
    items: Vec<String>,
    shape: Option<Vec<String>>,
    row: Option<Vec<String>>,
    cell: Option<Vec<String>>,
    paragraph: Option<String>,
    in_text: bool,
}

impl SlideWalker {
    fn start(&mut self, local: &[u8]) {
        match local {
            b"sp" => self.shape = Some(Vec::new()),
            b"tr" => self.row = Some(Vec::new()),
            b"tc" => self.cell = Some(Vec::new()),
            b"p" => self.paragraph = Some(String::new()),
            b"t" => self.in_text = true,
            _ => {}
        }
    }

    fn empty(&mut self, local: &[u8]) {
        match local {
            b"br" => {
                if let Some(paragraph) = self.paragraph.as_mut() {
                    paragraph.push('\n');
                }
            }
            b"p" | b"tc" | b"sp" => {
                self.start(local);
                self.end(local);
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text {
            if let Some(paragraph) = self.paragraph.as_mut() {
                paragraph.push_str(text);
            }
        }
    }

    fn end(&mut self, local: &[u8]) {
        match local {
            b"t" => self.in_text = false,
            b"p" => {
                if let Some(paragraph) = self.paragraph.take() {
                    if let Some(cell) = self.cell.as_mut() {
                        cell.push(paragraph);
                    } else if let Some(shape) = self.shape.as_mut() {
                        shape.push(paragraph);
                    }
                }
            }
            b"tc" => {
                if let (Some(cell), Some(row)) = (self.cell.take(), self.row.as_mut()) {
                    row.push(cell.join("\n"));
                }
            }
            b"tr" => {
                if let Some(row) = self.row.take() {
                    let row_text = row.join("\t");
                    if !row_text.trim().is_empty() {
                        self.items.push(row_text);
                    }
                }
            }
            b"sp" => {
                if let Some(shape) = self.shape.take() {
                    let text = shape.join("\n");
                    if !text.trim().is_empty() {
                        self.items.push(text);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Text items of one slide in document order: each shape's text frame,
/// then each table row tab-joined.
pub fn parse_slide_xml(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut walker = SlideWalker::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => walker.start(e.local_name().as_ref()),
            Ok(Event::Empty(e)) => walker.empty(e.local_name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| xml_error("slide", e))?;
                walker.text(&text);
            }
            Ok(Event::End(e)) => walker.end(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("slide", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(walker.items)
}

fn render_slides(slides: &[Vec<String>]) -> String {
    let mut lines = Vec::new();
    for (index, items) in slides.iter().enumerate() {
        lines.push(format!("[Slide {}]", index + 1));
        lines.extend(items.iter().cloned());
    }
    lines.join("\n")
}

impl DocumentParser for PptxParser {
    fn label(&self) -> &'static str {
        "PPTX Parser"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn extract_text(&self) -> ExtractedText {
        match self.read_slides() {
            Ok(slides) => {
                tracing::debug!(file = %self.path.display(), slides = slides.len(), "Parsed presentation");
                ExtractedText::content(render_slides(&slides))
            }
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
            let mut meta = DocumentMetadata {
                slide_count: Some(slide_parts(&mut package)?.len()),
                ..Default::default()
            };
            CoreProperties::read(&mut package)?.apply_to(&mut meta);
            Ok(meta)
        })();

        result.unwrap_or_else(DocumentMetadata::from_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::ooxml::fixtures::{write_package, CORE_XML};

    const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<p:sldIdLst>
<p:sldId id="256" r:id="rId3"/>
<p:sldId id="257" r:id="rId2"/>
</p:sldIdLst>
</p:presentation>"#;

    const PRESENTATION_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide2.xml"/>
</Relationships>"#;

    const TITLE_SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
<p:cSld><p:spTree>
<p:sp><p:txBody><a:bodyPr/><a:p><a:r><a:t>Roadmap 2025</a:t></a:r></a:p><a:p><a:r><a:t>Engineering</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:txBody><a:p/></p:txBody></p:sp>
</p:spTree></p:cSld>
</p:sld>"#;

    const TABLE_SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
<p:cSld><p:spTree>
<p:sp><p:txBody><a:p><a:r><a:t>Budget</a:t></a:r></a:p></p:txBody></p:sp>
<p:graphicFrame><a:graphic><a:graphicData><a:tbl>
<a:tr><a:tc><a:txBody><a:p><a:r><a:t>Q1</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>10k</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
<a:tr><a:tc><a:txBody><a:p/></a:txBody></a:tc><a:tc/></a:tr>
</a:tbl></a:graphicData></a:graphic></p:graphicFrame>
</p:spTree></p:cSld>
</p:sld>"#;

    fn write_pptx(dir: &Path, with_order: bool) -> PathBuf {
        let mut parts = vec![
            ("docProps/core.xml", CORE_XML),
            ("ppt/slides/slide1.xml", TABLE_SLIDE),
            ("ppt/slides/slide2.xml", TITLE_SLIDE),
        ];
        if with_order {
            parts.push((PRESENTATION_PART, PRESENTATION));
            parts.push((PRESENTATION_RELS_PART, PRESENTATION_RELS));
        }
        write_package(dir, "deck.pptx", &parts)
    }

    #[test]
    fn slide_items_in_document_order() {
        assert_eq!(
            parse_slide_xml(TITLE_SLIDE).unwrap(),
            vec!["Roadmap 2025\nEngineering"]
        );
        assert_eq!(parse_slide_xml(TABLE_SLIDE).unwrap(), vec!["Budget", "Q1\t10k"]);
    }

    #[test]
    fn slides_follow_presentation_order() {
        let dir = tempfile::tempdir().unwrap();
        let parser = PptxParser::new(&write_pptx(dir.path(), true)).unwrap();

        assert_eq!(
            parser.extract_text().text(),
            "[Slide 1]\nRoadmap 2025\nEngineering\n[Slide 2]\nBudget\nQ1\t10k"
        );
    }

    #[test]
    fn numeric_fallback_without_presentation_part() {
        let dir = tempfile::tempdir().unwrap();
        let parser = PptxParser::new(&write_pptx(dir.path(), false)).unwrap();

        assert_eq!(
            parser.extract_text().text(),
            "[Slide 1]\nBudget\nQ1\t10k\n[Slide 2]\nRoadmap 2025\nEngineering"
        );
    }

    #[test]
    fn metadata_has_slide_count_and_core_properties() {
        let dir = tempfile::tempdir().unwrap();
        let parser = PptxParser::new(&write_pptx(dir.path(), true)).unwrap();
        let meta = parser.extract_metadata();

        assert_eq!(meta.slide_count, Some(2));
        assert_eq!(meta.subject.as_deref(), Some("Finance"));
        assert_eq!(meta.keywords.as_deref(), Some("budget, 2024"));
    }

    #[test]
    fn legacy_ppt_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.ppt");
        std::fs::write(&path, b"\xD0\xCF\x11\xE0").unwrap();
        let parser = PptxParser::new(&path).unwrap();

        let text = parser.extract_text();
        assert!(text.is_degraded());
        assert!(text.text().starts_with("[PPTX Parser]"));
        assert!(parser.extract_metadata().error.is_some());
    }

    #[test]
    fn resolves_relative_and_absolute_targets() {
        assert_eq!(resolve_target("slides/slide3.xml"), "ppt/slides/slide3.xml");
        assert_eq!(resolve_target("/ppt/slides/slide3.xml"), "ppt/slides/slide3.xml");
    }
}
