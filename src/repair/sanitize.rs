//! XML part sanitizer.
//!
//! Rewrites allow-listed parts through the recovering parser so that they
//! come out well-formed and canonically indented. A part that cannot be
//! salvaged is left exactly as it was.

use super::StageOutcome;
use crate::container::decode_xml_bytes;
use crate::error::ErrorKind;
use crate::options::{Capabilities, RepairOptions};
use crate::package::ScratchTree;
use crate::report::{ActionKind, RepairReport};
use crate::xml;

/// Result of sanitizing one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizeResult {
    /// Canonical serialization of the recovered document
    Sanitized(String),
    /// Why nothing could be recovered
    Unrecoverable(String),
}

impl SanitizeResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, SanitizeResult::Sanitized(_))
    }
}

/// Recover and re-serialize raw part bytes.
///
/// `Sanitized` content always parses strictly, and sanitizing it again
/// returns it unchanged.
pub fn sanitize(bytes: &[u8]) -> SanitizeResult {
    let text = decode_xml_bytes(bytes)
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned());

    let recovered = match xml::parse_recovering(&text) {
        Ok(recovered) => recovered,
        Err(e) => return SanitizeResult::Unrecoverable(e.to_string()),
    };
    for warning in &recovered.warnings {
        tracing::debug!("recovered: {}", warning);
    }

    let content = match recovered.document.to_xml_string() {
        Ok(content) => content,
        Err(e) => return SanitizeResult::Unrecoverable(e.to_string()),
    };
    // Prefixes with no known namespace cannot be declared for the part.
    match xml::parse_strict(&content) {
        Ok(_) => SanitizeResult::Sanitized(content),
        Err(e) => SanitizeResult::Unrecoverable(e.to_string()),
    }
}

/// Sanitize every allow-listed part present in the tree.
pub fn sanitize_parts(
    tree: &ScratchTree,
    report: &mut RepairReport,
    options: &RepairOptions,
    caps: &Capabilities,
) -> StageOutcome {
    if !caps.xml_recovery {
        report.add_action(
            ActionKind::SanitizeSkipped,
            "XML recovery unavailable; sanitization skipped.",
        );
        return StageOutcome::Skipped;
    }

    let mut outcome = StageOutcome::Skipped;
    for key in &options.sanitize_targets {
        if !tree.exists(key) {
            report.add_action(ActionKind::PartMissing, format!("{} not present; skipping.", key));
            continue;
        }
        let bytes = match tree.read(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.add_error(e.kind(), format!("Failed to read {}: {}", key, e));
                outcome = outcome.merge(StageOutcome::Failed);
                continue;
            }
        };

        let step = match sanitize(&bytes) {
            SanitizeResult::Sanitized(content) => match tree.write(key, content) {
                Ok(()) => {
                    report.add_action(
                        ActionKind::PartSanitized,
                        format!("Sanitized XML for {}", key),
                    );
                    StageOutcome::Repaired
                }
                Err(e) => {
                    report.add_error(
                        e.kind(),
                        format!("Failed to write sanitized XML to {}: {}", key, e),
                    );
                    StageOutcome::Failed
                }
            },
            SanitizeResult::Unrecoverable(msg) => {
                report.add_error(
                    ErrorKind::PartParseError,
                    format!("XML parse error for {}: {}", key, msg),
                );
                report.add_action(
                    ActionKind::PartUnrecoverable,
                    format!("Could not fully parse {}; leaving for pandoc fallback.", key),
                );
                StageOutcome::Failed
            }
        };
        outcome = outcome.merge(step);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const BROKEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Fish &chips; &amp; more</w:t></w:r>
    <w:p><w:r><w:t xml:space="preserve">  kept  </w:t></w:r></w:p>
  </w:body>"#;

    fn sanitized(bytes: &[u8]) -> String {
        match sanitize(bytes) {
            SanitizeResult::Sanitized(content) => content,
            SanitizeResult::Unrecoverable(msg) => panic!("unrecoverable: {}", msg),
        }
    }

    #[test]
    fn test_recovered_output_is_well_formed() {
        let content = sanitized(BROKEN.as_bytes());
        let doc = xml::parse_strict(&content).unwrap();
        assert_eq!(doc.root.local_name(), "document");
        assert!(
            content.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>")
        );
        assert!(content.contains("&amp;chips;"));
        assert!(content.contains(">  kept  <"));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitized(BROKEN.as_bytes());
        let twice = sanitized(once.as_bytes());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stray_angle_bracket_in_text() {
        let input = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>a<b</w:t></w:r></w:p></w:body></w:document>"#;
        assert!(xml::parse_strict(input).is_err());

        let content = sanitized(input.as_bytes());
        let doc = xml::parse_strict(&content).unwrap();
        let t = doc.root.descendants("t")[0];
        assert_eq!(t.text(), "a<b</w:t>");
        assert!(content.contains("<w:t>a&lt;b&lt;/w:t&gt;</w:t>"));
        assert_eq!(sanitized(content.as_bytes()), content);
    }

    #[test]
    fn test_comment_with_double_hyphen() {
        let content = sanitized(b"<root><w:t>a<b</w:t><!-- x -- y --></root>");
        assert!(xml::parse_strict(&content).is_ok());
        assert!(!content.contains("x -- y"));
        assert_eq!(sanitized(content.as_bytes()), content);
    }

    #[test]
    fn test_undeclared_word_prefix_is_declared() {
        let content = sanitized(b"<w:document><w:body><w:p>");
        let doc = xml::parse_strict(&content).unwrap();
        assert_eq!(
            doc.root.namespace_in(&[]),
            Some("http://schemas.openxmlformats.org/wordprocessingml/2006/main")
        );
    }

    #[test]
    fn test_unknown_prefix_is_unrecoverable() {
        match sanitize(b"<zz:root><zz:a/></zz:root>") {
            SanitizeResult::Unrecoverable(msg) => assert!(msg.contains("zz")),
            other => panic!("expected unrecoverable, got {:?}", other),
        }
    }

    #[test]
    fn test_not_xml_is_unrecoverable() {
        assert!(!sanitize(b"PK\x03\x04 binary").is_ok());
        assert!(!sanitize(b"").is_ok());
        assert!(!sanitize(b"   ").is_ok());
    }

    #[test]
    fn test_utf16_part_becomes_utf8() {
        let text = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><a><b>\u{e9}</b></a>";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let content = sanitized(&bytes);
        assert!(content.contains("encoding=\"UTF-8\""));
        assert!(content.contains("<b>\u{e9}</b>"));
    }

    #[test]
    fn test_stage_rewrites_allow_list_only() {
        let tree = ScratchTree::create().unwrap();
        tree.write("word/document.xml", BROKEN).unwrap();
        tree.write("word/styles.xml", "this is not xml").unwrap();
        tree.write("word/settings.xml", "<w:settings><oops></w:settings>").unwrap();

        let mut report = RepairReport::new(Path::new("in.docx"));
        let outcome = sanitize_parts(
            &tree,
            &mut report,
            &RepairOptions::default(),
            &Capabilities::none().with_xml_recovery(true),
        );

        assert_eq!(outcome, StageOutcome::Failed);
        assert_eq!(
            report.action_kinds(),
            vec![
                ActionKind::PartSanitized,
                ActionKind::PartUnrecoverable,
                ActionKind::PartMissing
            ]
        );
        assert_eq!(report.error_kinds(), vec![ErrorKind::PartParseError]);
        assert_eq!(
            report.actions()[2].msg,
            "word/_rels/document.xml.rels not present; skipping."
        );

        let document = String::from_utf8(tree.read("word/document.xml").unwrap()).unwrap();
        assert!(xml::parse_strict(&document).is_ok());
        assert_eq!(tree.read("word/styles.xml").unwrap(), b"this is not xml");
        assert_eq!(
            tree.read("word/settings.xml").unwrap(),
            b"<w:settings><oops></w:settings>"
        );
    }

    #[test]
    fn test_stage_skipped_without_xml_recovery() {
        let tree = ScratchTree::create().unwrap();
        tree.write("word/document.xml", BROKEN).unwrap();

        let mut report = RepairReport::new(Path::new("in.docx"));
        let outcome = sanitize_parts(
            &tree,
            &mut report,
            &RepairOptions::default(),
            &Capabilities::none(),
        );

        assert_eq!(outcome, StageOutcome::Skipped);
        assert_eq!(tree.read("word/document.xml").unwrap(), BROKEN.as_bytes());
    }
}
