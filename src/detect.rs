//! Package format sniffing.
//!
//! Repair never refuses a package because of its format, but knowing what
//! was handed in makes the report far easier to read: a file that is not a
//! zip at all, or a spreadsheet renamed to `.docx`, explains a failed run.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// ZIP file magic bytes: PK\x03\x04
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Magic bytes of an empty ZIP archive: PK\x05\x06
const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// OLE compound file magic (legacy .doc, or an encrypted OOXML package)
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Content type for DOCX main document part.
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

/// Content type for XLSX workbook part.
const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";

/// Content type for PPTX presentation part.
const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";

/// Detected package format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    /// Microsoft Word document (.docx)
    Docx,
    /// Microsoft Excel workbook (.xlsx)
    Xlsx,
    /// Microsoft PowerPoint presentation (.pptx)
    Pptx,
    /// A zip archive with no recognizable Office layout
    Unknown,
}

impl FormatType {
    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            FormatType::Docx => "Word Document",
            FormatType::Xlsx => "Excel Workbook",
            FormatType::Pptx => "PowerPoint Presentation",
            FormatType::Unknown => "Unknown Package",
        }
    }
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the package format from its content types and entry names.
///
/// `content_types` is the (possibly damaged) text of `[Content_Types].xml`;
/// only substring checks are made, so malformed markup still counts.
pub fn detect_format(content_types: Option<&str>, names: &[String]) -> FormatType {
    if let Some(ct) = content_types {
        if ct.contains(DOCX_CONTENT_TYPE) {
            return FormatType::Docx;
        } else if ct.contains(XLSX_CONTENT_TYPE) {
            return FormatType::Xlsx;
        } else if ct.contains(PPTX_CONTENT_TYPE) {
            return FormatType::Pptx;
        }
    }

    // Fallback: check for format-specific folders
    let has_word = names.iter().any(|n| n.starts_with("word/"));
    let has_xl = names.iter().any(|n| n.starts_with("xl/"));
    let has_ppt = names.iter().any(|n| n.starts_with("ppt/"));

    match (has_word, has_xl, has_ppt) {
        (true, false, false) => FormatType::Docx,
        (false, true, false) => FormatType::Xlsx,
        (false, false, true) => FormatType::Pptx,
        _ => FormatType::Unknown,
    }
}

/// Check if data starts with ZIP magic bytes.
pub fn is_zip_file(data: &[u8]) -> bool {
    data.len() >= 4 && (data[..4] == ZIP_MAGIC || data[..4] == ZIP_EMPTY_MAGIC)
}

/// Short explanation of why a file that failed to open as a zip is not one.
///
/// Returns `None` when the leading bytes look like a zip archive, meaning
/// the damage is further in (e.g., a truncated central directory).
pub fn describe_non_zip(path: impl AsRef<Path>) -> Option<String> {
    let mut head = Vec::with_capacity(8);
    let file = File::open(path.as_ref()).ok()?;
    file.take(8).read_to_end(&mut head).ok()?;

    if head.is_empty() {
        return Some("file is empty".to_string());
    }
    if is_zip_file(&head) {
        return None;
    }
    if head.len() == OLE_MAGIC.len() && head[..] == OLE_MAGIC {
        return Some(
            "file is an OLE compound document (legacy .doc or encrypted package)".to_string(),
        );
    }
    Some(format!("missing zip signature (leading bytes {:02x?})", head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_type_display() {
        assert_eq!(FormatType::Docx.to_string(), "Word Document");
        assert_eq!(FormatType::Unknown.to_string(), "Unknown Package");
    }

    #[test]
    fn test_is_zip_file() {
        assert!(is_zip_file(&[0x50, 0x4B, 0x03, 0x04, 0x00]));
        assert!(is_zip_file(&[0x50, 0x4B, 0x05, 0x06]));
        assert!(!is_zip_file(&[0x00, 0x00, 0x00, 0x00]));
        assert!(!is_zip_file(&[0x50, 0x4B])); // Too short
    }

    #[test]
    fn test_detect_format_from_content_types() {
        let ct = format!(
            "<Types><Override PartName=\"/word/document.xml\" ContentType=\"{}\"",
            DOCX_CONTENT_TYPE
        );
        assert_eq!(detect_format(Some(&ct), &[]), FormatType::Docx);
    }

    #[test]
    fn test_detect_format_from_folders() {
        let names = vec!["xl/workbook.xml".to_string(), "_rels/.rels".to_string()];
        assert_eq!(detect_format(None, &names), FormatType::Xlsx);

        let names = vec!["word/document.xml".to_string()];
        assert_eq!(detect_format(Some("<Types"), &names), FormatType::Docx);

        assert_eq!(detect_format(None, &[]), FormatType::Unknown);
    }

    #[test]
    fn test_describe_non_zip() {
        let dir = tempfile::tempdir().unwrap();

        let text = dir.path().join("plain.docx");
        std::fs::write(&text, b"hello world").unwrap();
        assert!(describe_non_zip(&text).unwrap().contains("missing zip signature"));

        let empty = dir.path().join("empty.docx");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(describe_non_zip(&empty).as_deref(), Some("file is empty"));

        let ole = dir.path().join("legacy.docx");
        std::fs::write(&ole, OLE_MAGIC).unwrap();
        assert!(describe_non_zip(&ole).unwrap().contains("OLE"));

        let zip = dir.path().join("truncated.docx");
        std::fs::write(&zip, ZIP_MAGIC).unwrap();
        assert!(describe_non_zip(&zip).is_none());
    }
}
