//! Repair configuration.
//!
//! [`RepairOptions`] holds per-run choices; [`Capabilities`] describes what
//! the environment can do and is resolved once, then passed explicitly to
//! every stage that needs it.

use crate::convert::{Converter, Pandoc};
use std::path::PathBuf;
use std::sync::Arc;

/// Parts sanitized by default.
pub const DEFAULT_SANITIZE_TARGETS: [&str; 3] = [
    "word/document.xml",
    "word/styles.xml",
    "word/_rels/document.xml.rels",
];

/// Options for a repair run.
#[derive(Debug, Clone)]
pub struct RepairOptions {
    /// Output path; `<stem>.repaired.docx` next to the input when unset
    pub output: Option<PathBuf>,

    /// Verbosity toggle; the library records the same report either way
    pub quiet: bool,

    /// Parts the sanitizer may rewrite
    pub sanitize_targets: Vec<String>,

    /// Quarantine `customXml/` and prune references to it
    pub remove_custom_xml: bool,

    /// Write a minimal core properties part when the package has none
    pub synthesize_missing_metadata: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            output: None,
            quiet: false,
            sanitize_targets: DEFAULT_SANITIZE_TARGETS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            remove_custom_xml: true,
            synthesize_missing_metadata: false,
        }
    }
}

impl RepairOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output path.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Set quiet mode.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Replace the sanitizer allow-list.
    pub fn with_sanitize_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sanitize_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable custom XML removal.
    pub fn with_custom_xml_removal(mut self, remove: bool) -> Self {
        self.remove_custom_xml = remove;
        self
    }

    /// Enable or disable synthesizing a missing core properties part.
    pub fn with_synthesized_metadata(mut self, synthesize: bool) -> Self {
        self.synthesize_missing_metadata = synthesize;
        self
    }
}

/// What the environment offers to the repair stages.
#[derive(Clone)]
pub struct Capabilities {
    /// The recovering XML parser may be used
    pub xml_recovery: bool,

    /// Converter for the fallback stage, if any
    pub converter: Option<Arc<dyn Converter>>,
}

impl Capabilities {
    /// Detect what is available: XML recovery is built in, pandoc is looked up
    /// on the `PATH`.
    pub fn detect() -> Self {
        let converter = Pandoc::discover().map(|p| Arc::new(p) as Arc<dyn Converter>);
        tracing::debug!(converter = converter.is_some(), "capabilities detected");
        Self {
            xml_recovery: true,
            converter,
        }
    }

    /// No optional capability at all.
    pub fn none() -> Self {
        Self {
            xml_recovery: false,
            converter: None,
        }
    }

    /// Use the given converter for the fallback stage.
    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Enable or disable XML recovery.
    pub fn with_xml_recovery(mut self, enabled: bool) -> Self {
        self.xml_recovery = enabled;
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("xml_recovery", &self.xml_recovery)
            .field("converter", &self.converter.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = RepairOptions::default();
        assert!(opts.output.is_none());
        assert!(opts.remove_custom_xml);
        assert!(!opts.synthesize_missing_metadata);
        assert_eq!(opts.sanitize_targets, DEFAULT_SANITIZE_TARGETS);
    }

    #[test]
    fn test_builder_pattern() {
        let opts = RepairOptions::new()
            .with_output("out.docx")
            .with_quiet(true)
            .with_sanitize_targets(["word/document.xml"])
            .with_custom_xml_removal(false)
            .with_synthesized_metadata(true);

        assert_eq!(opts.output, Some(PathBuf::from("out.docx")));
        assert!(opts.quiet);
        assert_eq!(opts.sanitize_targets, vec!["word/document.xml"]);
        assert!(!opts.remove_custom_xml);
        assert!(opts.synthesize_missing_metadata);
    }

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::none();
        assert!(!caps.xml_recovery);
        assert!(caps.converter.is_none());

        let caps = caps
            .with_xml_recovery(true)
            .with_converter(Pandoc::with_program("pandoc"));
        assert!(caps.xml_recovery);
        assert_eq!(caps.converter.as_ref().map(|c| c.name()), Some("pandoc"));
        assert!(format!("{:?}", caps).contains("pandoc"));
    }
}
