//! Shared plumbing for Office Open XML packages (.docx, .xlsx, .pptx):
//! ZIP part access and `docProps/core.xml` parsing.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use super::types::DocumentMetadata;
use super::ExtractionError;

pub type Package = ZipArchive<BufReader<File>>;

const CORE_PROPERTIES_PART: &str = "docProps/core.xml";

pub fn open_package(path: &Path) -> Result<Package, ExtractionError> {
    let file = File::open(path)?;
    ZipArchive::new(BufReader::new(file))
        .map_err(|e| ExtractionError::Archive(format!("not an Office Open XML package: {e}")))
}

/// Read a part as UTF-8 text.
pub fn read_part(package: &mut Package, name: &str) -> Result<String, ExtractionError> {
    let mut part = package
        .by_name(name)
        .map_err(|e| ExtractionError::Archive(format!("missing part {name}: {e}")))?;
    let mut content = String::new();
    part.read_to_string(&mut content)?;
    Ok(content)
}

/// Like `read_part`, but a missing part is `None`.
pub fn read_optional_part(
    package: &mut Package,
    name: &str,
) -> Result<Option<String>, ExtractionError> {
    match package.by_name(name) {
        Ok(mut part) => {
            let mut content = String::new();
            part.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(ExtractionError::Archive(format!("cannot read {name}: {e}"))),
    }
}

/// Dublin Core properties from `docProps/core.xml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreProperties {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    pub last_modified_by: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
}

impl CoreProperties {
    /// Read core properties; a package without the part yields defaults.
    pub fn read(package: &mut Package) -> Result<Self, ExtractionError> {
        match read_optional_part(package, CORE_PROPERTIES_PART)? {
            Some(xml) => Ok(Self::parse(&xml)),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(xml: &str) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut props = Self::default();
        let mut current: Option<Vec<u8>> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => current = Some(e.local_name().as_ref().to_vec()),
                Ok(Event::Text(e)) => {
                    let Some(field) = current.as_deref() else {
                        buf.clear();
                        continue;
                    };
                    if let Ok(text) = e.unescape() {
                        let value = text.trim();
                        if !value.is_empty() {
                            props.set(field, value);
                        }
                    }
                }
                Ok(Event::End(_)) => current = None,
                Ok(Event::Eof) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Malformed core properties, keeping partial result");
                    break;
                }
                _ => {}
            }
            buf.clear();
        }

        props
    }

    fn set(&mut self, field: &[u8], value: &str) {
        let slot = match field {
            b"title" => &mut self.title,
            b"subject" => &mut self.subject,
            b"creator" => &mut self.creator,
            b"keywords" => &mut self.keywords,
            b"lastModifiedBy" => &mut self.last_modified_by,
            b"created" => &mut self.created,
            b"modified" => &mut self.modified,
            _ => return,
        };
        *slot = Some(match field {
            b"created" | b"modified" => normalize_w3cdtf(value),
            _ => value.to_string(),
        });
    }

    pub fn apply_to(self, meta: &mut DocumentMetadata) {
        meta.title = self.title;
        meta.subject = self.subject;
        meta.author = self.creator;
        meta.keywords = self.keywords;
        meta.last_modified_by = self.last_modified_by;
        meta.created_date = self.created;
        meta.modified_date = self.modified;
    }
}

/// W3CDTF timestamps are RFC 3339; re-render in UTC. Unparseable values pass through.
fn normalize_w3cdtf(value: &str) -> String {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .unwrap_or_else(|_| value.to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn parses_every_core_property() {
        let props = CoreProperties::parse(CORE_XML);
        assert_eq!(props.title.as_deref(), Some("Quarterly Report"));
        assert_eq!(props.subject.as_deref(), Some("Finance"));
        assert_eq!(props.creator.as_deref(), Some("Li Wei"));
        assert_eq!(props.keywords.as_deref(), Some("budget, 2024"));
        assert_eq!(props.last_modified_by.as_deref(), Some("Ana Souza"));
        assert_eq!(props.created.as_deref(), Some("2024-01-15T10:30:00+00:00"));
        assert_eq!(props.modified.as_deref(), Some("2024-02-01T00:00:00+00:00"));
    }

    #[test]
    fn unparseable_date_passes_through() {
        let xml = r#"<cp:coreProperties xmlns:cp="x" xmlns:dcterms="y"><dcterms:created>last week</dcterms:created></cp:coreProperties>"#;
        let props = CoreProperties::parse(xml);
        assert_eq!(props.created.as_deref(), Some("last week"));
    }

    #[test]
    fn apply_maps_creator_to_author() {
        let mut meta = DocumentMetadata::default();
        CoreProperties::parse(CORE_XML).apply_to(&mut meta);
        assert_eq!(meta.author.as_deref(), Some("Li Wei"));
        assert_eq!(meta.title.as_deref(), Some("Quarterly Report"));
        assert!(meta.created_date.is_some());
    }

    #[test]
    fn package_without_core_part_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_package(dir.path(), "bare.zip", &[("word/document.xml", "<w:document/>")]);
        let mut package = open_package(&path).unwrap();
        assert_eq!(CoreProperties::read(&mut package).unwrap(), CoreProperties::default());
        assert!(read_part(&mut package, "word/document.xml").is_ok());
        assert!(matches!(
            read_part(&mut package, "missing.xml"),
            Err(ExtractionError::Archive(_))
        ));
    }

    #[test]
    fn non_zip_file_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.doc");
        std::fs::write(&path, b"\xD0\xCF\x11\xE0 not a zip").unwrap();
        assert!(matches!(open_package(&path), Err(ExtractionError::Archive(_))));
    }
}
