//! Structural cleanup: custom XML data is set aside.
//!
//! Some consumers refuse a package whose `customXml/` parts are damaged even
//! when everything else is fine. The directory is moved to a quarantine key
//! that rebuilds skip, and references to it are pruned so the rebuilt
//! package has no dangling links.

use super::metadata::edit_part;
use super::StageOutcome;
use crate::container::{source_part_for, OoxmlContainer, CONTENT_TYPES};
use crate::options::RepairOptions;
use crate::package::{ScratchTree, QUARANTINE_SUFFIX};
use crate::report::{ActionKind, RepairReport};
use crate::xml::{XmlElement, XmlNode};

/// Top-level directory holding custom XML data parts.
pub const CUSTOM_XML_DIR: &str = "customXml";

/// Quarantine `customXml/` and drop references to it.
pub fn clean_structure(
    tree: &ScratchTree,
    report: &mut RepairReport,
    options: &RepairOptions,
) -> StageOutcome {
    if !options.remove_custom_xml {
        tracing::debug!("custom XML removal disabled");
        return StageOutcome::Skipped;
    }

    let quarantine = format!("{}{}", CUSTOM_XML_DIR, QUARANTINE_SUFFIX);
    match tree.relocate(CUSTOM_XML_DIR, &quarantine) {
        Ok(false) => {
            tracing::debug!("no customXml directory");
            StageOutcome::Skipped
        }
        Ok(true) => {
            report.add_action(
                ActionKind::CustomXmlQuarantined,
                format!(
                    "Moved {} to {} (some Word versions choke on custom XML).",
                    CUSTOM_XML_DIR, quarantine
                ),
            );
            StageOutcome::Repaired.merge(prune_references(tree, report))
        }
        Err(e) => {
            report.add_error(
                e.kind(),
                format!("Failed to move {} aside: {}", CUSTOM_XML_DIR, e),
            );
            StageOutcome::Failed
        }
    }
}

fn prune_references(tree: &ScratchTree, report: &mut RepairReport) -> StageOutcome {
    let keys = match tree.files() {
        Ok(keys) => keys,
        Err(e) => {
            report.add_error(e.kind(), format!("Failed to list scratch tree: {}", e));
            return StageOutcome::Failed;
        }
    };

    let mut outcome = StageOutcome::Skipped;
    for key in keys {
        let source = if key == CONTENT_TYPES {
            None
        } else {
            match source_part_for(&key) {
                Some(source) => Some(source),
                None => continue,
            }
        };
        if !mentions_custom_xml(tree, &key) {
            continue;
        }

        let mut removed = 0;
        let edited = edit_part(tree, &key, |root| {
            removed = match &source {
                None => root.remove_children(is_custom_xml_override),
                Some(source) => {
                    root.remove_children(|node| is_custom_xml_relationship(node, source))
                }
            };
            removed > 0
        });
        match edited {
            Ok(true) => {
                report.add_action(
                    ActionKind::ReferencesPruned,
                    format!("Removed {} customXml reference(s) from {}", removed, key),
                );
                outcome = outcome.merge(StageOutcome::Repaired);
            }
            Ok(false) => {}
            Err(e) => {
                report.add_error(
                    e.kind(),
                    format!("Could not prune customXml references from {}: {}", key, e),
                );
                outcome = outcome.merge(StageOutcome::Failed);
            }
        }
    }
    outcome
}

fn mentions_custom_xml(tree: &ScratchTree, key: &str) -> bool {
    tree.read(key)
        .map(|bytes| {
            String::from_utf8_lossy(&bytes)
                .to_ascii_lowercase()
                .contains("customxml")
        })
        .unwrap_or(false)
}

fn under_custom_xml(path: &str) -> bool {
    path.trim_start_matches('/')
        .to_ascii_lowercase()
        .starts_with("customxml/")
}

fn as_element(node: &XmlNode) -> Option<&XmlElement> {
    match node {
        XmlNode::Element(el) => Some(el),
        _ => None,
    }
}

fn is_custom_xml_override(node: &XmlNode) -> bool {
    as_element(node).is_some_and(|el| {
        el.local_name() == "Override" && el.attribute("PartName").is_some_and(under_custom_xml)
    })
}

fn is_custom_xml_relationship(node: &XmlNode, source: &str) -> bool {
    as_element(node).is_some_and(|el| {
        el.local_name() == "Relationship"
            && el.attribute("TargetMode") != Some("External")
            && el
                .attribute("Target")
                .is_some_and(|t| under_custom_xml(&OoxmlContainer::resolve_path(source, t)))
    })
}
