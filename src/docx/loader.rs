//! Strict DOCX loader implementation.

use super::styles::StyleMap;
use super::val_attr;
use crate::container::{OoxmlContainer, Relationships};
use crate::error::{Error, Result};
use crate::model::{Cell, Document, Metadata, Paragraph, Row, Table, TextRun};
use crate::xml::{self, XmlElement};

/// Relationship type suffix of the main document part.
const OFFICE_DOCUMENT_REL: &str = "/officeDocument";

/// Relationship type suffix of the core properties part.
const CORE_PROPERTIES_REL: &str = "/core-properties";

/// Relationship type suffix of the styles part.
const STYLES_REL: &str = "/styles";

/// Content types accepted for the main document part.
const MAIN_CONTENT_TYPES: [&str; 4] = [
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
    "application/vnd.ms-word.document.macroEnabled.main+xml",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.template.main+xml",
    "application/vnd.ms-word.template.macroEnabledTemplate.main+xml",
];

/// WordprocessingML main namespace, transitional and strict.
const WML_NAMESPACES: [&str; 2] = [
    "http://schemas.openxmlformats.org/wordprocessingml/2006/main",
    "http://purl.oclc.org/ooxml/wordprocessingml/main",
];

/// Related parts that a word processor parses as XML when it opens the
/// document. Anything else (media, fonts, custom data) is carried as bytes.
const XML_PART_RELS: [&str; 8] = [
    "/numbering",
    "/settings",
    "/header",
    "/footer",
    "/comments",
    "/footnotes",
    "/endnotes",
    "/fontTable",
];

/// Loader for DOCX (Word) packages.
pub struct DocxLoader {
    container: OoxmlContainer,
}

impl DocxLoader {
    /// Open a DOCX file for loading.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let container = OoxmlContainer::open(path)?;
        Ok(Self { container })
    }

    /// Create a loader from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let container = OoxmlContainer::from_bytes(data)?;
        Ok(Self { container })
    }

    /// Load the whole document.
    ///
    /// Fails on the first part that is missing, malformed, or of the wrong
    /// type.
    pub fn load(&self) -> Result<Document> {
        let content_types = self.container.read_content_types()?;
        let package_rels = self.container.read_package_relationships()?;
        self.check_targets("", &package_rels)?;

        let main_rel = package_rels
            .find_by_type_suffix(OFFICE_DOCUMENT_REL)
            .ok_or_else(|| {
                Error::MissingComponent("officeDocument relationship in _rels/.rels".to_string())
            })?;
        let main_part = OoxmlContainer::resolve_path("", &main_rel.target);

        match content_types.content_type(&main_part) {
            Some(ct) if MAIN_CONTENT_TYPES.contains(&ct) => {}
            Some(ct) => {
                return Err(Error::InvalidData(format!(
                    "{} has content type {}, not a Word document",
                    main_part, ct
                )))
            }
            None => {
                return Err(Error::InvalidData(format!(
                    "no content type declared for {}",
                    main_part
                )))
            }
        }

        let main_rels = self.container.read_relationships(&main_part)?;
        self.check_targets(&main_part, &main_rels)?;

        let mut doc = self.load_body(&main_part)?;

        if let Some(rel) = main_rels.find_by_type_suffix(STYLES_REL).filter(|r| !r.external) {
            let styles_part = OoxmlContainer::resolve_path(&main_part, &rel.target);
            let styles = StyleMap::parse(&self.container.read_xml(&styles_part)?)
                .map_err(|e| in_part(&styles_part, e))?;
            doc.styles = styles.ids();
        }

        for suffix in XML_PART_RELS {
            let related = main_rels
                .iter()
                .filter(|r| !r.external && r.rel_type.ends_with(suffix));
            for rel in related {
                let part = OoxmlContainer::resolve_path(&main_part, &rel.target);
                xml::parse_strict(&self.container.read_xml(&part)?)
                    .map_err(|e| in_part(&part, e))?;
            }
        }

        if let Some(rel) = package_rels
            .find_by_type_suffix(CORE_PROPERTIES_REL)
            .filter(|r| !r.external)
        {
            let core_part = OoxmlContainer::resolve_path("", &rel.target);
            doc.metadata = parse_core_properties(&self.container.read_xml(&core_part)?)
                .map_err(|e| in_part(&core_part, e))?;
        }

        Ok(doc)
    }

    /// Every internal relationship target must exist in the package.
    fn check_targets(&self, source: &str, rels: &Relationships) -> Result<()> {
        for rel in rels.iter().filter(|r| !r.external) {
            let target = OoxmlContainer::resolve_path(source, &rel.target);
            if !self.container.exists(&target) {
                return Err(Error::MissingComponent(format!(
                    "{} (relationship {} of {})",
                    target,
                    rel.id,
                    if source.is_empty() { "package" } else { source }
                )));
            }
        }
        Ok(())
    }

    /// Parse the main document part into body blocks.
    fn load_body(&self, main_part: &str) -> Result<Document> {
        let content = self.container.read_xml(main_part)?;
        let parsed = xml::parse_strict(&content).map_err(|e| in_part(main_part, e))?;

        let root = &parsed.root;
        let namespace = root.namespace_in(&[]);
        let in_wml = namespace.is_some_and(|ns| WML_NAMESPACES.contains(&ns));
        if root.local_name() != "document" || !in_wml {
            return Err(Error::InvalidData(format!(
                "{}: expected <w:document> in {}, found <{}> in {}",
                main_part,
                WML_NAMESPACES[0],
                root.name,
                namespace.unwrap_or("no namespace")
            )));
        }
        let body = root
            .elements()
            .find(|el| el.local_name() == "body" && el.namespace_in(&[root]) == namespace)
            .ok_or_else(|| Error::MissingComponent(format!("w:body in {}", main_part)))?;

        let mut doc = Document::new();
        collect_blocks(body, &mut doc);
        Ok(doc)
    }

    /// Access the underlying container.
    pub fn container(&self) -> &OoxmlContainer {
        &self.container
    }
}

fn in_part(part: &str, err: Error) -> Error {
    match err {
        Error::XmlParse(msg) => Error::XmlParse(format!("{}: {}", part, msg)),
        Error::InvalidData(msg) => Error::InvalidData(format!("{}: {}", part, msg)),
        other => other,
    }
}

fn collect_blocks(container: &XmlElement, doc: &mut Document) {
    for el in container.elements() {
        match el.local_name() {
            "p" => doc.add_paragraph(parse_paragraph(el)),
            "tbl" => doc.add_table(parse_table(el)),
            // Content controls wrap ordinary block content.
            "sdt" => {
                if let Some(content) = el.child("sdtContent") {
                    collect_blocks(content, doc);
                }
            }
            _ => {}
        }
    }
}

fn parse_paragraph(p: &XmlElement) -> Paragraph {
    let mut para = Paragraph::new();
    para.style = p
        .child("pPr")
        .and_then(|ppr| ppr.child("pStyle"))
        .and_then(val_attr)
        .map(String::from);

    for run in p.descendants("r") {
        let mut text = String::new();
        for el in run.elements() {
            match el.local_name() {
                "t" => text.push_str(&el.text()),
                "tab" => text.push('\t'),
                "br" | "cr" => text.push('\n'),
                _ => {}
            }
        }
        para.add_run(TextRun {
            text,
            style: run
                .child("rPr")
                .and_then(|rpr| rpr.child("rStyle"))
                .and_then(val_attr)
                .map(String::from),
        });
    }
    para
}

fn parse_table(tbl: &XmlElement) -> Table {
    let rows = tbl
        .elements()
        .filter(|e| e.local_name() == "tr")
        .map(|tr| Row {
            cells: tr
                .elements()
                .filter(|e| e.local_name() == "tc")
                .map(|tc| Cell {
                    content: tc
                        .elements()
                        .filter(|e| e.local_name() == "p")
                        .map(parse_paragraph)
                        .collect(),
                })
                .collect(),
        })
        .collect();
    Table { rows }
}

/// Parse docProps/core.xml into metadata.
pub(crate) fn parse_core_properties(content: &str) -> Result<Metadata> {
    let doc = xml::parse_strict(content)?;
    if doc.root.local_name() != "coreProperties" {
        return Err(Error::InvalidData(format!(
            "expected <cp:coreProperties>, found <{}>",
            doc.root.name
        )));
    }

    let mut meta = Metadata::default();
    for el in doc.root.elements() {
        let text = el.text();
        match el.local_name() {
            "title" => meta.title = Some(text),
            "creator" => meta.author = Some(text),
            "subject" => meta.subject = Some(text),
            "keywords" => {
                meta.keywords = text
                    .split([',', ';'])
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "created" => meta.created = Some(text),
            "modified" => meta.modified = Some(text),
            "lastModifiedBy" => meta.last_modified_by = Some(text),
            _ => {}
        }
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

    const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>world</w:t><w:tab/><w:t>!</w:t></w:r></w:p>
    <w:tbl><w:tr><w:tc><w:p><w:r><w:t>A1</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>B1</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
  </w:body>
</w:document>"#;

    fn package(entries: &[(&str, &str)]) -> Vec<u8> {
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

    fn load(entries: &[(&str, &str)]) -> Result<Document> {
        DocxLoader::from_bytes(package(entries))?.load()
    }

    #[test]
    fn test_load_minimal_document() {
        let doc = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", DOCUMENT),
        ])
        .unwrap();

        let paragraphs: Vec<_> = doc.paragraphs().collect();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].style.as_deref(), Some("Heading1"));
        assert_eq!(paragraphs[1].plain_text(), "Hello world\t!");
        assert_eq!(doc.tables().count(), 1);
        assert_eq!(doc.plain_text(), "Title\nHello world\t!\nA1\tB1");
    }

    #[test]
    fn test_missing_content_types_fails() {
        let err = load(&[("_rels/.rels", PACKAGE_RELS), ("word/document.xml", DOCUMENT)]);
        assert!(matches!(err, Err(Error::MissingComponent(_))));
    }

    #[test]
    fn test_malformed_document_fails() {
        let err = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", "<w:document><w:body><w:p></w:body></w:document>"),
        ]);
        match err {
            Err(Error::XmlParse(msg)) => assert!(msg.starts_with("word/document.xml")),
            other => panic!("expected XML error, got {:?}", other.map(|d| d.plain_text())),
        }
    }

    #[test]
    fn test_document_without_body_fails() {
        let err = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"/>"),
        ]);
        assert!(matches!(err, Err(Error::MissingComponent(_))));
    }

    #[test]
    fn test_undeclared_prefix_fails() {
        let err = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", "<w:document><w:body/></w:document>"),
        ]);
        match err {
            Err(Error::XmlParse(msg)) => assert!(msg.contains("prefix w is not defined")),
            other => panic!("expected XML error, got {:?}", other.map(|d| d.plain_text())),
        }
    }

    #[test]
    fn test_foreign_namespace_fails() {
        let err = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", "<x:document xmlns:x=\"urn:not-word\"><x:body/></x:document>"),
        ]);
        match err {
            Err(Error::InvalidData(msg)) => assert!(msg.contains("urn:not-word")),
            other => panic!("expected invalid data, got {:?}", other.map(|d| d.plain_text())),
        }
    }

    #[test]
    fn test_body_must_share_the_document_namespace() {
        let document = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:x="urn:x"><x:body/></w:document>"#;
        let err = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", document),
        ]);
        assert!(matches!(err, Err(Error::MissingComponent(_))));
    }

    #[test]
    fn test_strict_conformance_namespace_accepted() {
        let document = r#"<w:document xmlns:w="http://purl.oclc.org/ooxml/wordprocessingml/main"><w:body><w:p><w:r><w:t>ok</w:t></w:r></w:p></w:body></w:document>"#;
        let doc = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", document),
        ])
        .unwrap();
        assert_eq!(doc.plain_text(), "ok");
    }

    #[test]
    fn test_illegal_element_name_fails() {
        let document = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>a<b</w:t/></w:r></w:p></w:body></w:document>"#;
        let err = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", document),
        ]);
        assert!(matches!(err, Err(Error::XmlParse(_))));
    }

    #[test]
    fn test_dangling_relationship_fails() {
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/customXml" Target="../customXml/item1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;
        let err = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", DOCUMENT),
            ("word/_rels/document.xml.rels", rels),
        ]);
        match err {
            Err(Error::MissingComponent(msg)) => assert!(msg.contains("customXml/item1.xml")),
            other => panic!("expected missing component, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_wrong_main_content_type_fails() {
        let types = CONTENT_TYPES.replace(
            "wordprocessingml.document.main+xml",
            "spreadsheetml.sheet.main+xml",
        );
        let err = load(&[
            ("[Content_Types].xml", types.as_str()),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", DOCUMENT),
        ]);
        assert!(matches!(err, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_core_properties_loaded() {
        let rels = PACKAGE_RELS.replace(
            "</Relationships>",
            r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#,
        );
        let core = r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Quarterly</dc:title><dc:creator>Ada</dc:creator><cp:keywords>a; b, c</cp:keywords>
</cp:coreProperties>"#;
        let doc = load(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", rels.as_str()),
            ("word/document.xml", DOCUMENT),
            ("docProps/core.xml", core),
        ])
        .unwrap();
        assert_eq!(doc.metadata.title.as_deref(), Some("Quarterly"));
        assert_eq!(doc.metadata.author.as_deref(), Some("Ada"));
        assert_eq!(doc.metadata.keywords, vec!["a", "b", "c"]);
    }
}
