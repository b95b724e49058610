//! Minimal XML tree used by the repair stages.
//!
//! Parts are read into an owned tree, edited by key, and written back in a
//! canonical indented form. Two parse modes share the same tree builder:
//! [`parse_strict`] rejects anything that is not well-formed, while
//! [`parse_recovering`] salvages as much structure as it can.

mod names;
mod parser;
mod writer;

pub use names::{
    is_qualified_name, unbound_prefixes, well_known_namespace, WELL_KNOWN_NAMESPACES,
};
pub use parser::{parse_recovering, parse_strict, Recovered};

/// XML namespace bound to the `xml:` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// A child element
    Element(XmlElement),
    /// Unescaped character data
    Text(String),
    /// CDATA section content
    CData(String),
    /// Comment content
    Comment(String),
    /// Processing instruction content (target and data)
    ProcessingInstruction(String),
}

/// An element with its attributes and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written (e.g., "dc:title")
    pub name: String,
    /// Attributes in document order, values unescaped
    pub attributes: Vec<(String, String)>,
    /// Child nodes in document order
    pub children: Vec<XmlNode>,
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// Value of the `standalone` pseudo-attribute, if declared
    pub standalone: Option<String>,
    /// Comments and processing instructions before the root element
    pub prolog: Vec<XmlNode>,
    /// The document element
    pub root: XmlElement,
}

impl XmlDocument {
    /// Create a document around a root element.
    pub fn new(root: XmlElement) -> Self {
        Self {
            standalone: Some("yes".to_string()),
            prolog: Vec::new(),
            root,
        }
    }
}

impl XmlElement {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder helper: add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Builder helper: add a text child.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Builder helper: add an element child.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Local part of the element name.
    pub fn local_name(&self) -> &str {
        split_name(&self.name).1
    }

    /// Prefix of the element name, if any.
    pub fn prefix(&self) -> Option<&str> {
        split_name(&self.name).0
    }

    /// Get an attribute value by qualified name.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Iterate over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    /// All descendant elements (depth-first, document order) with the given local name.
    pub fn descendants<'a>(&'a self, local: &'a str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        collect_descendants(self, local, &mut found);
        found
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Namespace declarations made on this element, as (prefix, uri).
    ///
    /// The default namespace is reported with an empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(k, v)| {
            if k == "xmlns" {
                Some(("", v.as_str()))
            } else {
                k.strip_prefix("xmlns:").map(|p| (p, v.as_str()))
            }
        })
    }

    /// Prefix bound to `uri` by this element's own declarations.
    pub fn prefix_for_namespace(&self, uri: &str) -> Option<&str> {
        self.namespace_declarations()
            .find(|(p, u)| *u == uri && !p.is_empty())
            .map(|(p, _)| p)
    }

    /// Namespace URI of this element, given its ancestors (outermost first).
    pub fn namespace_in<'a>(&'a self, ancestors: &[&'a XmlElement]) -> Option<&'a str> {
        let prefix = self.prefix().unwrap_or("");
        if prefix == "xml" {
            return Some(XML_NS);
        }
        std::iter::once(self)
            .chain(ancestors.iter().rev().copied())
            .find_map(|el| {
                el.namespace_declarations()
                    .find(|(p, _)| *p == prefix)
                    .map(|(_, uri)| uri)
            })
            .filter(|uri| !uri.is_empty())
    }

    /// Elements in this subtree (self included) paired with their namespace URI.
    ///
    /// Prefixes are resolved against the declarations in scope at each element,
    /// starting from `inherited`.
    pub fn elements_with_namespace<'a>(
        &'a self,
        inherited: &[(&'a str, &'a str)],
    ) -> Vec<(&'a XmlElement, Option<&'a str>)> {
        let mut scope: Vec<(&str, &str)> = inherited.to_vec();
        let mut out = Vec::new();
        walk_namespaces(self, &mut scope, &mut out);
        out
    }

    /// Remove child nodes matching `pred`, returning how many were removed.
    pub fn remove_children<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&XmlNode) -> bool,
    {
        let before = self.children.len();
        self.children.retain(|n| !pred(n));
        before - self.children.len()
    }
}

fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn collect_descendants<'a>(el: &'a XmlElement, local: &str, found: &mut Vec<&'a XmlElement>) {
    for child in el.elements() {
        if child.local_name() == local {
            found.push(child);
        }
        collect_descendants(child, local, found);
    }
}

fn collect_text(el: &XmlElement, out: &mut String) {
    for node in &el.children {
        match node {
            XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
            _ => {}
        }
    }
}

fn walk_namespaces<'a>(
    el: &'a XmlElement,
    scope: &mut Vec<(&'a str, &'a str)>,
    out: &mut Vec<(&'a XmlElement, Option<&'a str>)>,
) {
    let mark = scope.len();
    scope.extend(el.namespace_declarations());

    let prefix = el.prefix().unwrap_or("");
    let uri = if prefix == "xml" {
        Some(XML_NS)
    } else {
        scope
            .iter()
            .rev()
            .find(|(p, _)| *p == prefix)
            .map(|(_, u)| *u)
            .filter(|u| !u.is_empty())
    };
    out.push((el, uri));

    for child in el.elements() {
        walk_namespaces(child, scope, out);
    }
    scope.truncate(mark);
}
