//! Paragraph and text run models.

use serde::{Deserialize, Serialize};

/// A run of text sharing one set of properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    /// Text content (tabs and breaks rendered as `\t` and `\n`)
    pub text: String,

    /// Character style ID, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl TextRun {
    /// Create a plain text run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: None,
        }
    }

    /// Check if the run has no text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Paragraph style ID (e.g., "Heading1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    /// Text runs
    #[serde(default)]
    pub runs: Vec<TextRun>,
}

impl Paragraph {
    /// Create an empty paragraph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a paragraph with a single plain run.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            runs: vec![TextRun::plain(text)],
            ..Default::default()
        }
    }

    /// Add a run.
    pub fn add_run(&mut self, run: TextRun) {
        self.runs.push(run);
    }

    /// Concatenated text of all runs.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Check if the paragraph has no text.
    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.is_empty())
    }
}
