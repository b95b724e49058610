//! Read-only ZIP container abstraction for OOXML packages.
//!
//! Used by the loader to open a rebuilt package the way a consuming
//! application would: parts are looked up by name, relationships and
//! content types are parsed strictly.

use crate::error::{Error, Result};
use crate::xml;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

/// Path of the package-level relationships part.
pub const PACKAGE_RELS: &str = "_rels/.rels";

/// Path of the content types part.
pub const CONTENT_TYPES: &str = "[Content_Types].xml";

/// A relationship entry from a .rels file.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1")
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target path (relative or absolute)
    pub target: String,
    /// Whether the target is external
    pub external: bool,
}

/// Collection of relationships parsed from a .rels file.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    /// Map from relationship ID to relationship data
    pub by_id: HashMap<String, Relationship>,
    /// Map from relationship type to list of relationships
    pub by_type: HashMap<String, Vec<Relationship>>,
}

impl Relationships {
    /// Create a new empty relationships collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a relationship by ID.
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.by_id.get(id)
    }

    /// First relationship whose type URI ends with `suffix`.
    ///
    /// Matching on the suffix accepts both the transitional and strict
    /// namespace variants (e.g., ".../officeDocument").
    pub fn find_by_type_suffix(&self, suffix: &str) -> Option<&Relationship> {
        let mut matches: Vec<&Relationship> = self
            .by_type
            .iter()
            .filter(|(t, _)| t.ends_with(suffix))
            .flat_map(|(_, rels)| rels.iter())
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.into_iter().next()
    }

    /// Iterate over every relationship.
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.by_id.values()
    }

    /// Number of relationships.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when there are no relationships.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Add a relationship.
    pub fn add(&mut self, rel: Relationship) {
        self.by_type
            .entry(rel.rel_type.clone())
            .or_default()
            .push(rel.clone());
        self.by_id.insert(rel.id.clone(), rel);
    }

    /// Parse the XML of a .rels part.
    ///
    /// The part must be well-formed and every relationship needs an Id and
    /// a Target.
    pub fn parse(content: &str) -> Result<Self> {
        let doc = xml::parse_strict(content)?;
        if doc.root.local_name() != "Relationships" {
            return Err(Error::InvalidData(format!(
                "expected <Relationships>, found <{}>",
                doc.root.name
            )));
        }

        let mut rels = Relationships::new();
        for el in doc.root.elements().filter(|e| e.local_name() == "Relationship") {
            let id = el.attribute("Id").unwrap_or_default();
            let target = el.attribute("Target").unwrap_or_default();
            if id.is_empty() || target.is_empty() {
                return Err(Error::InvalidData(
                    "relationship without Id or Target".to_string(),
                ));
            }
            if rels.get(id).is_some() {
                return Err(Error::InvalidData(format!("duplicate relationship id {}", id)));
            }
            rels.add(Relationship {
                id: id.to_string(),
                rel_type: el.attribute("Type").unwrap_or_default().to_string(),
                target: target.to_string(),
                external: el
                    .attribute("TargetMode")
                    .is_some_and(|m| m.eq_ignore_ascii_case("external")),
            });
        }
        Ok(rels)
    }
}

/// Content types declared by `[Content_Types].xml`.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    /// Extension (lowercase, no dot) to content type
    pub defaults: HashMap<String, String>,
    /// Part name (no leading slash) to content type
    pub overrides: HashMap<String, String>,
}

impl ContentTypes {
    /// Parse the XML of the content types part.
    pub fn parse(content: &str) -> Result<Self> {
        let doc = xml::parse_strict(content)?;
        if doc.root.local_name() != "Types" {
            return Err(Error::InvalidData(format!(
                "expected <Types>, found <{}>",
                doc.root.name
            )));
        }

        let mut types = ContentTypes::default();
        for el in doc.root.elements() {
            let content_type = el.attribute("ContentType").unwrap_or_default().to_string();
            match el.local_name() {
                "Default" => {
                    if let Some(ext) = el.attribute("Extension") {
                        types.defaults.insert(ext.to_ascii_lowercase(), content_type);
                    }
                }
                "Override" => {
                    if let Some(part) = el.attribute("PartName") {
                        types
                            .overrides
                            .insert(part.trim_start_matches('/').to_string(), content_type);
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    /// Content type of a part, from its override or its extension default.
    pub fn content_type(&self, part: &str) -> Option<&str> {
        let part = part.trim_start_matches('/');
        if let Some(ct) = self.overrides.get(part) {
            return Some(ct);
        }
        let ext = Path::new(part).extension()?.to_str()?.to_ascii_lowercase();
        self.defaults.get(&ext).map(String::as_str)
    }
}

/// Fix XML encoding declaration from UTF-16 to UTF-8.
///
/// When we decode UTF-16 XML to a Rust String (UTF-8), the XML declaration
/// still says encoding="UTF-16". Rewritten parts are UTF-8 on disk, so the
/// declaration has to follow.
fn fix_xml_encoding_declaration(content: &str) -> String {
    if content.starts_with("<?xml") {
        if let Some(end_decl) = content.find("?>") {
            let decl = &content[..end_decl + 2];
            let rest = &content[end_decl + 2..];

            let fixed_decl = decl
                .replace("encoding=\"UTF-16\"", "encoding=\"UTF-8\"")
                .replace("encoding='UTF-16'", "encoding='UTF-8'")
                .replace("encoding=\"utf-16\"", "encoding=\"UTF-8\"")
                .replace("encoding='utf-16'", "encoding='UTF-8'");

            return format!("{}{}", fixed_decl, rest);
        }
    }
    content.to_string()
}

/// Decode XML bytes handling different encodings (UTF-8, UTF-16 LE/BE).
///
/// Parts are normally UTF-8, but damaged or non-standard packages may carry
/// UTF-16 parts with or without a byte order mark. Anything else is decoded
/// lossily so the recovering parser still gets a chance.
pub fn decode_xml_bytes(bytes: &[u8]) -> Result<String> {
    // UTF-8 BOM: EF BB BF
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(bytes[3..].to_vec())
            .map_err(|e| Error::Encoding(e.to_string()));
    }

    // UTF-16 LE BOM: FF FE
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let content = decode_utf16(&bytes[2..], u16::from_le_bytes)?;
        return Ok(fix_xml_encoding_declaration(&content));
    }

    // UTF-16 BE BOM: FE FF
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let content = decode_utf16(&bytes[2..], u16::from_be_bytes)?;
        return Ok(fix_xml_encoding_declaration(&content));
    }

    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Ok(s),
        Err(_) => {
            // ASCII markup in UTF-16 leaves a zero byte in every other position.
            if bytes.len() >= 4 && bytes[0] == b'<' && bytes[1] == 0 && bytes[3] == 0 {
                decode_utf16(bytes, u16::from_le_bytes).map(|s| fix_xml_encoding_declaration(&s))
            } else if bytes.len() >= 4 && bytes[0] == 0 && bytes[1] == b'<' && bytes[2] == 0 {
                decode_utf16(bytes, u16::from_be_bytes).map(|s| fix_xml_encoding_declaration(&s))
            } else {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// Decode UTF-16 bytes with the given byte order.
fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Result<String> {
    // Ensure even number of bytes
    let len = bytes.len() & !1;

    let units = (0..len)
        .step_by(2)
        .map(|i| to_unit([bytes[i], bytes[i + 1]]));

    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::Encoding(e.to_string()))
}

/// OOXML container abstraction over a ZIP archive.
pub struct OoxmlContainer {
    archive: RefCell<zip::ZipArchive<Cursor<Vec<u8>>>>,
}

impl OoxmlContainer {
    /// Open an OOXML container from a file path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use redocx::container::OoxmlContainer;
    ///
    /// let container = OoxmlContainer::open("document.docx")?;
    /// assert!(container.exists("word/document.xml"));
    /// # Ok::<(), redocx::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Create an OOXML container from a byte vector.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let cursor = Cursor::new(data);
        let archive = zip::ZipArchive::new(cursor)?;
        Ok(Self {
            archive: RefCell::new(archive),
        })
    }

    /// Read an XML part from the archive as a string.
    pub fn read_xml(&self, path: &str) -> Result<String> {
        let bytes = self.read_binary(path)?;
        decode_xml_bytes(&bytes)
    }

    /// Read a binary part from the archive.
    pub fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.borrow_mut();
        let mut file = archive
            .by_name(path)
            .map_err(|_| Error::MissingComponent(path.to_string()))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Check if a part exists in the archive.
    pub fn exists(&self, path: &str) -> bool {
        let archive = self.archive.borrow();
        let result = archive.file_names().any(|n| n == path);
        result
    }

    /// List all entries in the archive.
    pub fn list_files(&self) -> Vec<String> {
        let archive = self.archive.borrow();
        archive.file_names().map(String::from).collect()
    }

    /// Read and parse the content types part.
    pub fn read_content_types(&self) -> Result<ContentTypes> {
        ContentTypes::parse(&self.read_xml(CONTENT_TYPES)?)
    }

    /// Read package-level relationships (_rels/.rels).
    pub fn read_package_relationships(&self) -> Result<Relationships> {
        Relationships::parse(&self.read_xml(PACKAGE_RELS)?)
    }

    /// Read the relationships of a part.
    ///
    /// A part without a .rels file has no relationships; a .rels file that
    /// exists but is malformed is an error.
    pub fn read_relationships(&self, part_path: &str) -> Result<Relationships> {
        let rels_path = rels_path_for(part_path);
        if !self.exists(&rels_path) {
            return Ok(Relationships::new());
        }
        Relationships::parse(&self.read_xml(&rels_path)?)
    }

    /// Resolve a relative path from a base path.
    pub fn resolve_path(base: &str, relative: &str) -> String {
        if let Some(stripped) = relative.strip_prefix('/') {
            return stripped.to_string();
        }

        let base_path = Path::new(base);
        let base_dir = base_path.parent().unwrap_or(Path::new(""));

        let mut result = base_dir.to_path_buf();
        for component in Path::new(relative).components() {
            match component {
                std::path::Component::ParentDir => {
                    result.pop();
                }
                std::path::Component::Normal(c) => {
                    result.push(c);
                }
                _ => {}
            }
        }

        result.to_string_lossy().replace('\\', "/")
    }
}

/// Path of the .rels part that belongs to `part_path`.
///
/// The package itself ("" or "/") maps to `_rels/.rels`.
pub fn rels_path_for(part_path: &str) -> String {
    let part_path = part_path.trim_start_matches('/');
    if part_path.is_empty() {
        return PACKAGE_RELS.to_string();
    }
    match part_path.rsplit_once('/') {
        Some((dir, name)) => format!("{}/_rels/{}.rels", dir, name),
        None => format!("_rels/{}.rels", part_path),
    }
}

/// Path of the part that owns a .rels part, or `None` for non-rels paths.
///
/// Inverse of [`rels_path_for`]; `_rels/.rels` maps to the package root ("").
pub fn source_part_for(rels_path: &str) -> Option<String> {
    let (dir, file) = match rels_path.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => return None,
    };
    let name = file.strip_suffix(".rels")?;
    let parent = match dir.strip_suffix("_rels") {
        Some(parent) => parent.trim_end_matches('/'),
        None => return None,
    };
    Some(match (parent.is_empty(), name.is_empty()) {
        (_, true) => String::new(),
        (true, false) => name.to_string(),
        (false, false) => format!("{}/{}", parent, name),
    })
}

impl std::fmt::Debug for OoxmlContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OoxmlContainer")
            .field("files", &self.list_files().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buffer));
            for (name, content) in entries {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buffer
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            OoxmlContainer::resolve_path("word/document.xml", "../media/image1.png"),
            "media/image1.png"
        );
        assert_eq!(
            OoxmlContainer::resolve_path("word/document.xml", "styles.xml"),
            "word/styles.xml"
        );
        assert_eq!(
            OoxmlContainer::resolve_path("word/document.xml", "../customXml/item1.xml"),
            "customXml/item1.xml"
        );
        assert_eq!(
            OoxmlContainer::resolve_path("", "word/document.xml"),
            "word/document.xml"
        );
        assert_eq!(
            OoxmlContainer::resolve_path("word/document.xml", "/word/media/image1.png"),
            "word/media/image1.png"
        );
    }

    #[test]
    fn test_rels_paths() {
        assert_eq!(rels_path_for(""), "_rels/.rels");
        assert_eq!(
            rels_path_for("word/document.xml"),
            "word/_rels/document.xml.rels"
        );
        assert_eq!(source_part_for("_rels/.rels").as_deref(), Some(""));
        assert_eq!(
            source_part_for("word/_rels/document.xml.rels").as_deref(),
            Some("word/document.xml")
        );
        assert_eq!(source_part_for("word/document.xml"), None);
    }

    #[test]
    fn test_relationships_parse() {
        let rels = Relationships::parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#,
        )
        .unwrap();

        assert_eq!(rels.len(), 2);
        assert!(rels.get("rId2").map(|r| r.external).unwrap_or(false));
        assert_eq!(
            rels.find_by_type_suffix("/officeDocument").map(|r| r.target.as_str()),
            Some("word/document.xml")
        );
    }

    #[test]
    fn test_relationships_reject_malformed() {
        let missing_target = "<Relationships><Relationship Id=\"rId1\"></Relationships>";
        assert!(Relationships::parse(missing_target).is_err());
        assert!(Relationships::parse("<Types/>").is_err());
        assert!(Relationships::parse(
            "<Relationships><Relationship Id=\"a\" Target=\"x\"/><Relationship Id=\"a\" Target=\"y\"/></Relationships>"
        )
        .is_err());
    }

    #[test]
    fn test_content_types_lookup() {
        let types = ContentTypes::parse(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="XML" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#,
        )
        .unwrap();
        assert_eq!(
            types.content_type("/word/document.xml"),
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml")
        );
        assert_eq!(types.content_type("word/styles.xml"), Some("application/xml"));
        assert_eq!(types.content_type("word/media/image1.png"), None);
    }

    #[test]
    fn test_container_reads_parts() {
        let data = zip_bytes(&[
            ("[Content_Types].xml", "<Types/>"),
            ("word/document.xml", "<w:document/>"),
        ]);
        let container = OoxmlContainer::from_bytes(data).unwrap();
        assert!(container.exists("word/document.xml"));
        assert!(!container.exists("word/styles.xml"));
        assert_eq!(container.list_files().len(), 2);
        assert_eq!(container.read_xml("word/document.xml").unwrap(), "<w:document/>");
        assert!(matches!(
            container.read_xml("word/styles.xml"),
            Err(Error::MissingComponent(_))
        ));
        assert!(container
            .read_relationships("word/document.xml")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_container_rejects_non_zip() {
        let err = OoxmlContainer::from_bytes(b"definitely not a zip".to_vec()).unwrap_err();
        assert!(matches!(err, Error::ZipArchive(_)));
    }

    #[test]
    fn test_utf16_decoding_function() {
        // UTF-16 LE with BOM
        let utf16_le = b"\xFF\xFE<\0a\0/\0>\0";
        assert_eq!(decode_xml_bytes(utf16_le).unwrap(), "<a/>");

        // UTF-16 BE with BOM
        let utf16_be = b"\xFE\xFF\0<\0a\0/\0>";
        assert_eq!(decode_xml_bytes(utf16_be).unwrap(), "<a/>");

        // UTF-8 with and without BOM
        assert_eq!(decode_xml_bytes(b"\xEF\xBB\xBF<a/>").unwrap(), "<a/>");
        assert_eq!(decode_xml_bytes(b"<a/>").unwrap(), "<a/>");

        // Declared encoding follows the decoded text
        let declared = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><a/>";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in declared.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(
            decode_xml_bytes(&bytes).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>"
        );
    }

    #[test]
    fn test_invalid_utf8_decodes_lossily() {
        let decoded = decode_xml_bytes(b"<a>\xFF</a>").unwrap();
        assert_eq!(decoded, "<a>\u{FFFD}</a>");
    }
}
