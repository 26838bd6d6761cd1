use std::borrow::Cow;
use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, GBK, UTF_8, WINDOWS_1252};

use super::types::{ensure_exists, DegradeReason, DocumentMetadata, DocumentParser, ExtractedText};
use super::ExtractionError;

/// Plain-text family: source code, markup, notes.
pub struct TextParser {
    path: PathBuf,
}

impl TextParser {
    pub fn new(path: &Path) -> Result<Self, ExtractionError> {
        Ok(Self {
            path: ensure_exists(path)?,
        })
    }

    fn read_decoded(&self) -> Result<Decoded, ExtractionError> {
        let bytes = std::fs::read(&self.path)?;
        Ok(decode_text(&bytes))
    }
}

/// Decoded file contents plus the encoding that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
}

/// Decode raw bytes, trying a BOM first, then strict UTF-8, then strict GBK.
/// Windows-1252 maps every byte and closes the chain.
pub fn decode_text(bytes: &[u8]) -> Decoded {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return Decoded {
            text: text.into_owned(),
            encoding,
        };
    }

    for encoding in [UTF_8, GBK] {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return Decoded {
                text: text.into_owned(),
                encoding,
            };
        }
    }

    let (text, _): (Cow<'_, str>, bool) = WINDOWS_1252.decode_without_bom_handling(bytes);
    Decoded {
        text: text.into_owned(),
        encoding: WINDOWS_1252,
    }
}

impl DocumentParser for TextParser {
    fn label(&self) -> &'static str {
        "Text Parser"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn extract_text(&self) -> ExtractedText {
        match self.read_decoded() {
            Ok(decoded) => {
                tracing::debug!(
                    file = %self.path.display(),
                    encoding = decoded.encoding.name(),
                    chars = decoded.text.chars().count(),
                    "Decoded text file"
                );
                ExtractedText::content(decoded.text)
            }
            Err(e) => ExtractedText::degraded(
                self.label(),
                DegradeReason::ExtractionFailure(e.to_string()),
                &self.path,
            ),
        }
    }

    fn extract_metadata(&self) -> DocumentMetadata {
        match self.read_decoded() {
            Ok(Decoded { text, encoding }) => DocumentMetadata {
                encoding: Some(encoding.name().to_lowercase()),
                line_count: Some(text.matches('\n').count() + 1),
                word_count: Some(text.split_whitespace().count()),
                char_count: Some(text.chars().count()),
                ..Default::default()
            },
            Err(e) => DocumentMetadata::from_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn utf8_is_decoded() {
        let decoded = decode_text("第一季度 report".as_bytes());
        assert_eq!(decoded.text, "第一季度 report");
        assert_eq!(decoded.encoding, UTF_8);
    }

    #[test]
    fn utf16_with_bom_is_decoded() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hi there".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = decode_text(&bytes);
        assert_eq!(decoded.text, "hi there");
        assert_eq!(decoded.encoding.name(), "UTF-16LE");
    }

    #[test]
    fn gbk_is_tried_before_windows_1252() {
        let (bytes, _, _) = GBK.encode("合同");
        let decoded = decode_text(&bytes);
        assert_eq!(decoded.text, "合同");
        assert_eq!(decoded.encoding, GBK);
    }

    #[test]
    fn undecodable_bytes_fall_back_to_windows_1252() {
        // 0xE9 followed by 0xFF is invalid in both UTF-8 and GBK.
        let decoded = decode_text(&[b'c', b'a', b'f', 0xE9, 0xFF]);
        assert_eq!(decoded.encoding, WINDOWS_1252);
        assert!(decoded.text.starts_with("caf"));
    }

    #[test]
    fn missing_file_fails_construction() {
        let err = TextParser::new(Path::new("/nope/absent.txt")).err().unwrap();
        assert!(matches!(err, ExtractionError::FileNotFound(_)));
    }

    #[test]
    fn extracts_text_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.md", b"# Title\nsecond line here\n");
        let parser = TextParser::new(&path).unwrap();

        assert_eq!(parser.extract_text().text(), "# Title\nsecond line here\n");

        let meta = parser.extract_metadata();
        assert_eq!(meta.encoding.as_deref(), Some("utf-8"));
        assert_eq!(meta.line_count, Some(3));
        assert_eq!(meta.word_count, Some(5));
        assert_eq!(meta.char_count, Some(25));
        assert!(meta.error.is_none());
    }

    #[test]
    fn empty_file_is_content_not_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "empty.txt", b"");
        let parser = TextParser::new(&path).unwrap();

        let text = parser.extract_text();
        assert!(!text.is_degraded());
        assert_eq!(text.text(), "");
        assert_eq!(parser.extract_metadata().line_count, Some(1));
    }

    #[test]
    fn file_removed_after_construction_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "gone.txt", b"x");
        let parser = TextParser::new(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let text = parser.extract_text();
        assert!(matches!(
            text.degrade_reason(),
            Some(DegradeReason::ExtractionFailure(_))
        ));
        assert!(text.text().contains("[Text Parser]"));
        assert!(parser.extract_metadata().error.is_some());
    }

    #[test]
    fn summary_uses_extracted_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "long.txt", "a".repeat(20).as_bytes());
        let parser = TextParser::new(&path).unwrap();
        assert_eq!(parser.extract_summary(5), "aaaaa...");
    }
}
