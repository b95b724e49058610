//! DOCX styles part.

use super::val_attr;
use crate::error::{Error, Result};
use crate::xml;
use std::collections::HashMap;

/// Style type (paragraph, character, table, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleType {
    Paragraph,
    Character,
    Table,
    Numbering,
}

/// A style definition.
#[derive(Debug, Clone, Default)]
pub struct Style {
    /// Style ID (e.g., "Heading1")
    pub id: String,
    /// Style name (e.g., "heading 1")
    pub name: Option<String>,
    /// Style type
    pub style_type: Option<StyleType>,
    /// Based on another style
    pub based_on: Option<String>,
    /// Whether this is the default style of its type
    pub is_default: bool,
}

/// Collection of styles from styles.xml.
#[derive(Debug, Clone, Default)]
pub struct StyleMap {
    /// Styles by ID
    pub styles: HashMap<String, Style>,
}

impl StyleMap {
    /// Parse a styles part.
    ///
    /// The part must be well-formed and rooted at `w:styles`.
    pub fn parse(content: &str) -> Result<Self> {
        let doc = xml::parse_strict(content)?;
        if doc.root.local_name() != "styles" {
            return Err(Error::InvalidData(format!(
                "expected <w:styles>, found <{}>",
                doc.root.name
            )));
        }

        let mut map = StyleMap::default();
        for el in doc.root.elements().filter(|e| e.local_name() == "style") {
            let mut style = Style::default();
            for (key, value) in &el.attributes {
                match key.rsplit(':').next().unwrap_or(key) {
                    "styleId" => style.id = value.clone(),
                    "type" => {
                        style.style_type = match value.as_str() {
                            "paragraph" => Some(StyleType::Paragraph),
                            "character" => Some(StyleType::Character),
                            "table" => Some(StyleType::Table),
                            "numbering" => Some(StyleType::Numbering),
                            _ => None,
                        }
                    }
                    "default" => style.is_default = matches!(value.as_str(), "1" | "true" | "on"),
                    _ => {}
                }
            }
            style.name = el.child("name").and_then(val_attr).map(String::from);
            style.based_on = el.child("basedOn").and_then(val_attr).map(String::from);

            if !style.id.is_empty() {
                map.styles.insert(style.id.clone(), style);
            }
        }
        Ok(map)
    }

    /// Look up a style by ID.
    pub fn get(&self, id: &str) -> Option<&Style> {
        self.styles.get(id)
    }

    /// The default style of a type, if one is marked.
    pub fn default_of(&self, style_type: StyleType) -> Option<&Style> {
        self.styles
            .values()
            .find(|s| s.is_default && s.style_type == Some(style_type))
    }

    /// Style IDs, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.styles.keys().cloned().collect();
        ids.sort();
        ids
    }
}
