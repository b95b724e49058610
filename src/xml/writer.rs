//! Canonical serialization of [`XmlDocument`] trees.

use super::{is_qualified_name, XmlDocument, XmlElement, XmlNode};
use crate::error::{Error, Result};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

const INDENT: &str = "  ";

impl XmlDocument {
    /// Serialize as UTF-8 with an XML declaration and two-space indentation.
    ///
    /// Only element-only content is indented. Elements holding text or CDATA,
    /// and everything under `xml:space="preserve"`, are written exactly as
    /// they are. Text is written verbatim apart from escaping `<`, `>` and
    /// `&`, so parsing the output again in recovery mode and re-serializing
    /// it yields the same bytes.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new(
            "1.0",
            Some("UTF-8"),
            self.standalone.as_deref(),
        )))?;
        for node in &self.prolog {
            newline(&mut writer, 0)?;
            write_node(&mut writer, node, 0, false, true)?;
        }
        newline(&mut writer, 0)?;
        write_element(&mut writer, &self.root, 0, false, true)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|e| Error::Encoding(e.to_string()))
    }
}

fn newline<W: Write>(writer: &mut Writer<W>, depth: usize) -> Result<()> {
    let indent = format!("\n{}", INDENT.repeat(depth));
    writer.write_event(Event::Text(BytesText::from_escaped(indent)))?;
    Ok(())
}

fn is_blank(node: &XmlNode) -> bool {
    matches!(node, XmlNode::Text(t) if t.trim().is_empty())
}

fn check_name(name: &str) -> Result<()> {
    if is_qualified_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidData(format!("'{}' is not a legal XML name", name)))
    }
}

fn write_element<W: Write>(
    writer: &mut Writer<W>,
    el: &XmlElement,
    depth: usize,
    inherited_preserve: bool,
    pretty: bool,
) -> Result<()> {
    check_name(&el.name)?;
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        check_name(key)?;
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    let preserve = match el.attribute("xml:space") {
        Some("preserve") => true,
        Some("default") => false,
        _ => inherited_preserve,
    };
    let has_elements = el.children.iter().any(|n| matches!(n, XmlNode::Element(_)));
    let has_content = el.children.iter().any(|n| match n {
        XmlNode::Text(_) => !is_blank(n),
        XmlNode::CData(_) => true,
        _ => false,
    });
    let indent = pretty && !preserve && has_elements && !has_content;

    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        if indent {
            // Indentation replaces whatever whitespace was there.
            if is_blank(child) {
                continue;
            }
            newline(writer, depth + 1)?;
        }
        write_node(writer, child, depth + 1, preserve, indent)?;
    }
    if indent {
        newline(writer, depth)?;
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}

fn write_node<W: Write>(
    writer: &mut Writer<W>,
    node: &XmlNode,
    depth: usize,
    preserve: bool,
    pretty: bool,
) -> Result<()> {
    match node {
        XmlNode::Element(el) => write_element(writer, el, depth, preserve, pretty)?,
        XmlNode::Text(text) => {
            writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?
        }
        XmlNode::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str())))?,
        XmlNode::Comment(comment) => {
            if comment.contains("--") || comment.ends_with('-') {
                return Err(Error::InvalidData(format!(
                    "comment cannot contain '--': {}",
                    comment
                )));
            }
            writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?
        }
        XmlNode::ProcessingInstruction(pi) => {
            writer.write_event(Event::PI(BytesPI::new(pi.as_str())))?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::{parse_recovering, parse_strict};
    use super::*;

    #[test]
    fn test_pretty_output() {
        let doc = XmlDocument::new(
            XmlElement::new("Relationships")
                .with_attribute("xmlns", "urn:rels")
                .with_child(
                    XmlElement::new("Relationship")
                        .with_attribute("Id", "rId1")
                        .with_attribute("Target", "a&b.xml"),
                ),
        );
        let xml = doc.to_xml_string().unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <Relationships xmlns=\"urn:rels\">\n  \
             <Relationship Id=\"rId1\" Target=\"a&amp;b.xml\"/>\n\
             </Relationships>\n"
        );
    }

    #[test]
    fn test_mixed_content_is_not_indented() {
        let doc = parse_strict("<w:t xmlns:w=\"urn:w\">a &lt; b</w:t>").unwrap();
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains("<w:t xmlns:w=\"urn:w\">a &lt; b</w:t>"));
    }

    #[test]
    fn test_mixed_content_keeps_its_whitespace() {
        let input = "<w:p xmlns:w=\"urn:w\"><w:r><w:t>a<w:b/>c<w:i/></w:t></w:r>\
                     <w:r xml:space=\"preserve\"><w:t>x</w:t> <w:t>y</w:t></w:r></w:p>";
        let xml = parse_recovering(input).unwrap().document.to_xml_string().unwrap();
        assert!(xml.contains("<w:t>a<w:b/>c<w:i/></w:t>"));
        assert!(xml.contains("<w:r xml:space=\"preserve\"><w:t>x</w:t> <w:t>y</w:t></w:r>"));
        assert!(xml.contains("<w:p xmlns:w=\"urn:w\">\n  <w:r>\n    <w:t>"));
    }

    #[test]
    fn test_strict_whitespace_is_reindented() {
        let doc = parse_strict("<a>\n\t\t<b/>\n\t\t<c>\n<d/></c></a>").unwrap();
        assert_eq!(
            doc.to_xml_string().unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <a>\n  <b/>\n  <c>\n    <d/>\n  </c>\n</a>\n"
        );
    }

    #[test]
    fn test_illegal_names_and_comments_refused() {
        let doc = XmlDocument::new(XmlElement::new("b</w:t"));
        assert!(doc.to_xml_string().is_err());

        let doc = XmlDocument::new(XmlElement::new("a").with_attribute("x y", "1"));
        assert!(doc.to_xml_string().is_err());

        let mut root = XmlElement::new("a");
        root.children.push(XmlNode::Comment(" x -- y ".to_string()));
        assert!(XmlDocument::new(root).to_xml_string().is_err());
    }

    #[test]
    fn test_serialization_is_idempotent() {
        let input = "<root><p class='x'>one<b>two</b> three<p>four &nope; <!-- c --><![CDATA[<raw>]]>";
        let first = parse_recovering(input).unwrap().document.to_xml_string().unwrap();
        let second = parse_recovering(&first)
            .unwrap()
            .document
            .to_xml_string()
            .unwrap();
        assert_eq!(first, second);
        assert!(parse_strict(&first).is_ok());
    }
}
