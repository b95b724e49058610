//! XML names and namespace prefixes.

use super::XmlElement;

/// Namespaces Word packages commonly use, keyed by their conventional prefix.
///
/// The recovering parser binds these when a part uses the prefix without
/// declaring it.
pub const WELL_KNOWN_NAMESPACES: [(&str, &str); 16] = [
    ("w", "http://schemas.openxmlformats.org/wordprocessingml/2006/main"),
    ("r", "http://schemas.openxmlformats.org/officeDocument/2006/relationships"),
    ("wp", "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"),
    ("a", "http://schemas.openxmlformats.org/drawingml/2006/main"),
    ("pic", "http://schemas.openxmlformats.org/drawingml/2006/picture"),
    ("m", "http://schemas.openxmlformats.org/officeDocument/2006/math"),
    ("mc", "http://schemas.openxmlformats.org/markup-compatibility/2006"),
    ("v", "urn:schemas-microsoft-com:vml"),
    ("o", "urn:schemas-microsoft-com:office:office"),
    ("w10", "urn:schemas-microsoft-com:office:word"),
    ("w14", "http://schemas.microsoft.com/office/word/2010/wordml"),
    ("w15", "http://schemas.microsoft.com/office/word/2012/wordml"),
    ("cp", "http://schemas.openxmlformats.org/package/2006/metadata/core-properties"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("dcterms", "http://purl.org/dc/terms/"),
    ("xsi", "http://www.w3.org/2001/XMLSchema-instance"),
];

/// Namespace conventionally bound to `prefix` in Word packages.
pub fn well_known_namespace(prefix: &str) -> Option<&'static str> {
    WELL_KNOWN_NAMESPACES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| *uri)
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

/// A name without a colon (`NCName` in Namespaces in XML).
fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// True for `local` or `prefix:local` where both sides are NCNames.
pub fn is_qualified_name(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(name),
    }
}

/// Prefixes used in the subtree without a declaration in scope, in order of
/// first use.
///
/// `xml` and `xmlns` are always bound. An empty URI (`xmlns:p=""`) does not
/// bind a prefix.
pub fn unbound_prefixes(root: &XmlElement) -> Vec<String> {
    let mut scope = Vec::new();
    let mut found = Vec::new();
    collect_unbound(root, &mut scope, &mut found);
    found
}

fn collect_unbound<'a>(el: &'a XmlElement, scope: &mut Vec<&'a str>, found: &mut Vec<String>) {
    let mark = scope.len();
    scope.extend(
        el.namespace_declarations()
            .filter(|(p, uri)| !p.is_empty() && !uri.is_empty())
            .map(|(p, _)| p),
    );

    let used = std::iter::once(el.name.as_str())
        .chain(el.attributes.iter().map(|(k, _)| k.as_str()))
        .filter_map(|name| name.split_once(':').map(|(p, _)| p));
    for prefix in used {
        if matches!(prefix, "xml" | "xmlns") || scope.contains(&prefix) {
            continue;
        }
        if !found.iter().any(|p| p == prefix) {
            found.push(prefix.to_string());
        }
    }

    for child in el.elements() {
        collect_unbound(child, scope, found);
    }
    scope.truncate(mark);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_names() {
        assert!(is_qualified_name("w:t"));
        assert!(is_qualified_name("Relationship"));
        assert!(is_qualified_name("xmlns:w14"));
        assert!(is_qualified_name("_x.y-z"));
        assert!(is_qualified_name("\u{e9}l\u{e9}ment"));

        assert!(!is_qualified_name(""));
        assert!(!is_qualified_name("b</w:t"));
        assert!(!is_qualified_name("a:b:c"));
        assert!(!is_qualified_name(":a"));
        assert!(!is_qualified_name("a:"));
        assert!(!is_qualified_name("1st"));
        assert!(!is_qualified_name("-x"));
    }

    #[test]
    fn test_unbound_prefixes() {
        let root = XmlElement::new("w:document")
            .with_attribute("xmlns:w", "urn:w")
            .with_attribute("xml:space", "preserve")
            .with_child(
                XmlElement::new("w:body")
                    .with_attribute("r:id", "rId1")
                    .with_child(XmlElement::new("x:inner").with_attribute("xmlns:x", "urn:x"))
                    .with_child(XmlElement::new("x:outer")),
            )
            .with_child(XmlElement::new("v:shape").with_attribute("xmlns:v", ""));

        assert_eq!(unbound_prefixes(&root), vec!["r", "x", "v"]);
    }

    #[test]
    fn test_well_known_namespace() {
        assert_eq!(
            well_known_namespace("w"),
            Some("http://schemas.openxmlformats.org/wordprocessingml/2006/main")
        );
        assert_eq!(well_known_namespace("zz"), None);
    }
}
