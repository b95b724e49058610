//! Document model structures.

use super::{Paragraph, Table};
use serde::{Deserialize, Serialize};

/// Document metadata read from docProps/core.xml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Document author/creator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Document subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Keywords/tags
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub keywords: Vec<String>,

    /// Creation date (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    /// Last modification date (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,

    /// Last modified by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
}

/// A content block in the document body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Block {
    /// A paragraph of text
    Paragraph(Paragraph),
    /// A table
    Table(Table),
}

/// A loaded Word document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Document metadata
    pub metadata: Metadata,

    /// Body content in document order
    #[serde(default)]
    pub blocks: Vec<Block>,

    /// Style IDs defined by the styles part
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub styles: Vec<String>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a paragraph to the body.
    pub fn add_paragraph(&mut self, para: Paragraph) {
        self.blocks.push(Block::Paragraph(para));
    }

    /// Add a table to the body.
    pub fn add_table(&mut self, table: Table) {
        self.blocks.push(Block::Table(table));
    }

    /// Iterate over top-level paragraphs.
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    /// Iterate over top-level tables.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    /// Check if the document body is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Extract all text content as a single string.
    pub fn plain_text(&self) -> String {
        let mut text = String::new();
        for block in &self.blocks {
            match block {
                Block::Paragraph(para) => text.push_str(&para.plain_text()),
                Block::Table(table) => text.push_str(&table.plain_text()),
            }
            text.push('\n');
        }
        text.trim().to_string()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, Row, TextRun};

    #[test]
    fn test_document_creation() {
        let mut doc = Document::new();
        assert!(doc.is_empty());

        doc.add_paragraph(Paragraph {
            runs: vec![TextRun::plain("Hello, World!")],
            ..Default::default()
        });
        doc.add_table(Table {
            rows: vec![Row {
                cells: vec![Cell::with_text("A1"), Cell::with_text("B1")],
            }],
        });

        assert!(!doc.is_empty());
        assert_eq!(doc.paragraphs().count(), 1);
        assert_eq!(doc.tables().count(), 1);
        assert_eq!(doc.plain_text(), "Hello, World!\nA1\tB1");
    }

    #[test]
    fn test_document_json() {
        let mut doc = Document::new();
        doc.metadata.title = Some("Report".to_string());
        doc.add_paragraph(Paragraph::with_text("Body"));

        let json = doc.to_json().unwrap();
        assert!(json.contains("\"title\": \"Report\""));
        assert!(json.contains("\"type\": \"Paragraph\""));
        assert!(!json.contains("\"author\""));
    }
}
