//! Strict and recovering XML tree builders on top of quick-xml events.

use super::names::{is_qualified_name, unbound_prefixes, well_known_namespace};
use super::{XmlDocument, XmlElement, XmlNode};
use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;

/// How much of a broken entity reference goes into the error message.
const PREVIEW_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strict,
    Recover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// What a start tag turned into.
enum Tag {
    Element(XmlElement),
    /// A tag whose name is not a legal XML name, kept as character data
    Literal(String),
}

/// Result of a recovering parse.
#[derive(Debug, Clone)]
pub struct Recovered {
    /// The salvaged document
    pub document: XmlDocument,
    /// Problems that were worked around, in the order they were met
    pub warnings: Vec<String>,
}

impl Recovered {
    /// True when the input needed no recovery at all.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Parse a well-formed XML document.
///
/// Any structural problem is an error: mismatched or unclosed tags, illegal
/// names, unknown entities, illegal characters, `--` inside comments, prefixes
/// without a namespace declaration, several roots or text outside the root.
pub fn parse_strict(content: &str) -> Result<XmlDocument> {
    parse(content, Mode::Strict).map(|r| r.document)
}

/// Parse XML, repairing whatever can be repaired.
///
/// Unclosed elements are closed at the end of input, stray end tags are
/// dropped, broken entity references and tags with illegal names are kept as
/// literal text, and illegal characters are removed. `--` inside comments is
/// split up. Undeclared prefixes with a conventional Word namespace are
/// declared on the root element. Whitespace-only text is discarded unless it
/// is the sole content of its element or `xml:space="preserve"` is in scope.
///
/// Fails only when no root element can be salvaged.
pub fn parse_recovering(content: &str) -> Result<Recovered> {
    let mut recovered = parse(content, Mode::Recover)?;
    strip_blank_text(&mut recovered.document.root, false);
    Ok(recovered)
}

fn parse(content: &str, mode: Mode) -> Result<Recovered> {
    let content = content.trim_start_matches('\u{feff}');
    match content.trim_start().chars().next() {
        Some('<') => {}
        Some(_) => {
            return Err(Error::XmlParse(
                "Start tag expected, '<' not found".to_string(),
            ))
        }
        None => return Err(Error::XmlParse("Document is empty".to_string())),
    }

    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.trim_text(false);
    config.expand_empty_elements = false;
    config.check_comments = mode == Mode::Strict;
    if mode == Mode::Recover {
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    let mut builder = TreeBuilder::new(mode);

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                let msg = format!("{} (at byte {})", e, reader.buffer_position());
                if mode == Mode::Strict {
                    return Err(Error::XmlParse(msg));
                }
                builder.warn(msg);
                break;
            }
        };

        let flow = match event {
            Event::Decl(decl) => {
                if let Some(Ok(value)) = decl.standalone() {
                    builder.standalone = Some(lossy(&value).into_owned());
                }
                Flow::Continue
            }
            Event::DocType(_) => {
                builder.warn("DOCTYPE declaration dropped".to_string());
                Flow::Continue
            }
            Event::Start(e) => match builder.element(&e, false)? {
                Tag::Element(el) => builder.open(el)?,
                Tag::Literal(text) => builder.text(text)?,
            },
            Event::Empty(e) => match builder.element(&e, true)? {
                Tag::Element(el) => builder.empty(el)?,
                Tag::Literal(text) => builder.text(text)?,
            },
            Event::End(e) => {
                let name = lossy(e.name().as_ref()).into_owned();
                builder.close(&name)?;
                Flow::Continue
            }
            Event::Text(e) => {
                let text = unescape(&lossy(&e), mode)?;
                builder.text(text)?
            }
            Event::CData(e) => {
                let mut data = String::new();
                push_chars(&mut data, &lossy(&e), mode)?;
                builder.leaf(XmlNode::CData(data))?
            }
            Event::Comment(e) => {
                let comment = builder.comment(&lossy(&e))?;
                builder.leaf(XmlNode::Comment(comment))?
            }
            Event::PI(e) => {
                builder.leaf(XmlNode::ProcessingInstruction(lossy(&e).into_owned()))?
            }
            Event::Eof => break,
        };

        if flow == Flow::Stop {
            break;
        }
    }

    builder.finish()
}

fn lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

struct TreeBuilder {
    mode: Mode,
    stack: Vec<XmlElement>,
    root: Option<XmlElement>,
    prolog: Vec<XmlNode>,
    standalone: Option<String>,
    warnings: Vec<String>,
}

impl TreeBuilder {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            stack: Vec::new(),
            root: None,
            prolog: Vec::new(),
            standalone: None,
            warnings: Vec::new(),
        }
    }

    fn strict(&self) -> bool {
        self.mode == Mode::Strict
    }

    fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    /// Fail in strict mode, record a warning otherwise.
    fn problem(&mut self, msg: String) -> Result<()> {
        if self.strict() {
            return Err(Error::XmlParse(msg));
        }
        self.warn(msg);
        Ok(())
    }

    fn element(&mut self, start: &BytesStart, empty: bool) -> Result<Tag> {
        let name = lossy(start.name().as_ref()).into_owned();
        if !is_qualified_name(&name) {
            self.problem(format!("invalid element name '{}'", name))?;
            let raw: String = lossy(start).chars().filter(|&c| is_xml_char(c)).collect();
            let close = if empty { "/>" } else { ">" };
            return Ok(Tag::Literal(format!("<{}{}", raw, close)));
        }

        let mut el = XmlElement::new(name);
        for attr in start.attributes().with_checks(self.strict()) {
            let attr = match attr {
                Ok(attr) => attr,
                Err(e) => {
                    self.problem(format!("malformed attribute on <{}>: {}", el.name, e))?;
                    continue;
                }
            };
            let key = lossy(attr.key.as_ref()).into_owned();
            if !is_qualified_name(&key) {
                self.problem(format!("invalid attribute name '{}' on <{}>", key, el.name))?;
                continue;
            }
            if el.attribute(&key).is_some() {
                self.problem(format!("duplicate attribute {} on <{}>", key, el.name))?;
                continue;
            }
            let value = unescape(&lossy(&attr.value), self.mode)?;
            el.attributes.push((key, value));
        }
        Ok(Tag::Element(el))
    }

    fn open(&mut self, el: XmlElement) -> Result<Flow> {
        if self.stack.is_empty() && self.root.is_some() {
            self.problem(format!("Extra content at the end of the document: <{}>", el.name))?;
            return Ok(Flow::Stop);
        }
        self.stack.push(el);
        Ok(Flow::Continue)
    }

    fn empty(&mut self, el: XmlElement) -> Result<Flow> {
        if self.open(el)? == Flow::Stop {
            return Ok(Flow::Stop);
        }
        self.pop();
        Ok(Flow::Continue)
    }

    fn close(&mut self, name: &str) -> Result<()> {
        if self.strict() && !is_qualified_name(name) {
            return Err(Error::XmlParse(format!("invalid end tag name '{}'", name)));
        }
        match self.stack.iter().rposition(|el| el.name == name) {
            Some(pos) if pos + 1 == self.stack.len() => {
                self.pop();
            }
            Some(pos) => {
                let unclosed = self.stack[pos + 1..]
                    .iter()
                    .map(|el| el.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.problem(format!("</{}> closes unclosed element(s): {}", name, unclosed))?;
                while self.stack.len() > pos {
                    self.pop();
                }
            }
            None => {
                self.problem(format!("stray end tag </{}> dropped", name))?;
            }
        }
        Ok(())
    }

    fn pop(&mut self) {
        if let Some(el) = self.stack.pop() {
            match self.stack.last_mut() {
                Some(parent) => parent.children.push(XmlNode::Element(el)),
                None => self.root = Some(el),
            }
        }
    }

    fn text(&mut self, text: String) -> Result<Flow> {
        if let Some(current) = self.stack.last_mut() {
            if text.is_empty() {
                return Ok(Flow::Continue);
            }
            if let Some(XmlNode::Text(previous)) = current.children.last_mut() {
                previous.push_str(&text);
            } else {
                current.children.push(XmlNode::Text(text));
            }
            return Ok(Flow::Continue);
        }
        if text.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        if self.root.is_some() {
            self.problem("Extra content at the end of the document".to_string())?;
            return Ok(Flow::Stop);
        }
        self.problem("text before the root element dropped".to_string())?;
        Ok(Flow::Continue)
    }

    /// Comment text that may be written back as a comment.
    fn comment(&mut self, raw: &str) -> Result<String> {
        if self.strict() {
            if raw.contains("--") || raw.ends_with('-') {
                return Err(Error::XmlParse(
                    "'--' is not allowed inside a comment".to_string(),
                ));
            }
            push_chars(&mut String::new(), raw, self.mode)?;
            return Ok(raw.to_string());
        }

        let mut text: String = raw.chars().filter(|&c| is_xml_char(c)).collect();
        while text.contains("--") {
            text = text.replace("--", "- -");
        }
        if text.ends_with('-') {
            text.push(' ');
        }
        if text != raw {
            self.warn("comment text adjusted".to_string());
        }
        Ok(text)
    }

    fn leaf(&mut self, node: XmlNode) -> Result<Flow> {
        match self.stack.last_mut() {
            Some(current) => current.children.push(node),
            None if self.root.is_none() => {
                if !matches!(node, XmlNode::CData(_)) {
                    self.prolog.push(node);
                }
            }
            // Trailing comments and processing instructions are legal but not kept.
            None => {}
        }
        Ok(Flow::Continue)
    }

    fn finish(mut self) -> Result<Recovered> {
        if !self.stack.is_empty() {
            let unclosed = self
                .stack
                .iter()
                .map(|el| el.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            self.problem(format!("Premature end of data, unclosed element(s): {}", unclosed))?;
            while !self.stack.is_empty() {
                self.pop();
            }
        }

        let mut root = self
            .root
            .take()
            .ok_or_else(|| Error::XmlParse("Document is empty".to_string()))?;

        for prefix in unbound_prefixes(&root) {
            let msg = format!("Namespace prefix {} is not defined", prefix);
            if self.strict() {
                return Err(Error::XmlParse(msg));
            }
            match well_known_namespace(&prefix) {
                Some(uri) => {
                    root.set_attribute(&format!("xmlns:{}", prefix), uri);
                    self.warn(format!("{}; bound to {}", msg, uri));
                }
                None => self.warn(msg),
            }
        }

        Ok(Recovered {
            document: XmlDocument {
                standalone: self.standalone,
                prolog: self.prolog,
                root,
            },
            warnings: self.warnings,
        })
    }
}

/// Resolve character and predefined entity references.
///
/// Broken references are an error in strict mode and kept as literal text
/// in recovery mode.
fn unescape(raw: &str, mode: Mode) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        push_chars(&mut out, &rest[..amp], mode)?;
        let after = &rest[amp + 1..];

        let resolved =
            entity_end(after).and_then(|end| resolve_entity(&after[..end]).map(|c| (end, c)));

        match resolved {
            Some((end, c)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                if mode == Mode::Strict {
                    let preview: String = after.chars().take(PREVIEW_LEN).collect();
                    return Err(Error::XmlParse(format!(
                        "invalid entity reference '&{}'",
                        preview
                    )));
                }
                out.push('&');
                rest = after;
            }
        }
    }

    push_chars(&mut out, rest, mode)?;
    Ok(out)
}

/// Byte offset of the `;` ending the reference name at the start of `after`.
fn entity_end(after: &str) -> Option<usize> {
    let end = after.find(|c: char| !(c.is_alphanumeric() || matches!(c, '#' | '_' | '-' | '.')))?;
    after[end..].starts_with(';').then_some(end)
}

fn resolve_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?
        }
    };
    is_xml_char(c).then_some(c)
}

fn push_chars(out: &mut String, text: &str, mode: Mode) -> Result<()> {
    if text.chars().all(is_xml_char) {
        out.push_str(text);
        return Ok(());
    }
    if mode == Mode::Strict {
        return Err(Error::XmlParse(
            "character not allowed in XML content".to_string(),
        ));
    }
    out.extend(text.chars().filter(|&c| is_xml_char(c)));
    Ok(())
}

/// Characters allowed by the XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn strip_blank_text(el: &mut XmlElement, inherited_preserve: bool) {
    let preserve = match el.attribute("xml:space") {
        Some("preserve") => true,
        Some("default") => false,
        _ => inherited_preserve,
    };

    if !preserve && el.children.len() > 1 {
        el.children
            .retain(|n| !matches!(n, XmlNode::Text(t) if t.trim().is_empty()));
    }

    for child in el.children.iter_mut() {
        if let XmlNode::Element(child) = child {
            strip_blank_text(child, preserve);
        }
    }
}
