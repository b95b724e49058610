//! Core properties repair (`docProps/core.xml`).

use super::StageOutcome;
use crate::container::{decode_xml_bytes, CONTENT_TYPES, PACKAGE_RELS};
use crate::error::{ErrorKind, Result};
use crate::options::{Capabilities, RepairOptions};
use crate::package::ScratchTree;
use crate::report::{ActionKind, RepairReport};
use crate::xml::{self, XmlElement, XmlNode};
use chrono::{DateTime, SecondsFormat, Utc};

/// Key of the core properties part.
pub const CORE_PART: &str = "docProps/core.xml";

/// Title written when the package has none.
pub const DEFAULT_TITLE: &str = "Repaired Document";

/// Creator written when the package has none.
pub const DEFAULT_CREATOR: &str = "AutoRepair";

const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

const CORE_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.core-properties+xml";

const CORE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";

/// Minimal core properties document, timestamped `now`.
pub fn minimal_core_properties(now: DateTime<Utc>) -> String {
    let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="{dc}" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <dc:title>{title}</dc:title>
  <dc:creator>{creator}</dc:creator>
  <cp:lastModifiedBy>{creator}</cp:lastModifiedBy>
  <dcterms:created xsi:type="dcterms:W3CDTF">{stamp}</dcterms:created>
  <dcterms:modified xsi:type="dcterms:W3CDTF">{stamp}</dcterms:modified>
</cp:coreProperties>
"#,
        dc = DC_NS,
        title = DEFAULT_TITLE,
        creator = DEFAULT_CREATOR,
        stamp = stamp,
    )
}

/// Make sure the package metadata has a title and a creator.
///
/// An absent part is left alone unless synthesis is enabled. A part that
/// cannot be recovered at all is replaced by [`minimal_core_properties`].
pub fn repair_metadata(
    tree: &ScratchTree,
    report: &mut RepairReport,
    options: &RepairOptions,
    caps: &Capabilities,
) -> StageOutcome {
    if !caps.xml_recovery {
        report.add_action(
            ActionKind::MetadataSkipped,
            "XML recovery unavailable; metadata check skipped.",
        );
        return StageOutcome::Skipped;
    }

    if !tree.exists(CORE_PART) {
        report.add_action(
            ActionKind::MetadataSkipped,
            "No core.xml found - nothing to fix for metadata.",
        );
        if options.synthesize_missing_metadata {
            return synthesize(tree, report);
        }
        return StageOutcome::Skipped;
    }

    let bytes = match tree.read(CORE_PART) {
        Ok(bytes) => bytes,
        Err(e) => {
            report.add_error(e.kind(), format!("Failed to read {}: {}", CORE_PART, e));
            return StageOutcome::Failed;
        }
    };
    let text = decode_xml_bytes(&bytes)
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());

    let mut recovered = match xml::parse_recovering(&text) {
        Ok(recovered) => recovered,
        Err(e) => {
            report.add_error(
                ErrorKind::PartParseError,
                format!("XML parse error for {}: {}", CORE_PART, e),
            );
            return rewrite_minimal(tree, report);
        }
    };
    for warning in &recovered.warnings {
        tracing::debug!(part = CORE_PART, "recovered: {}", warning);
    }

    let inserted = ensure_core_fields(&mut recovered.document.root);
    for field in &inserted {
        report.add_action(
            ActionKind::MetadataFieldInserted,
            format!("Inserted missing {} tag in core.xml", field),
        );
    }

    let written = recovered
        .document
        .to_xml_string()
        .and_then(|content| tree.write(CORE_PART, content));
    match written {
        Ok(()) => {
            report.add_action(
                ActionKind::MetadataNormalized,
                "Rewrote core.xml with ensured basic metadata",
            );
            StageOutcome::Repaired
        }
        Err(e) => {
            report.add_error(e.kind(), format!("Failed to rewrite core.xml properly: {}", e));
            StageOutcome::Failed
        }
    }
}

fn rewrite_minimal(tree: &ScratchTree, report: &mut RepairReport) -> StageOutcome {
    report.add_action(
        ActionKind::MetadataRewritten,
        "Attempting to rewrite core.xml with safer template.",
    );
    match tree.write(CORE_PART, minimal_core_properties(Utc::now())) {
        Ok(()) => {
            report.add_action(ActionKind::MetadataRewritten, "Wrote minimal core.xml");
            StageOutcome::Repaired
        }
        Err(e) => {
            report.add_error(e.kind(), format!("Failed to write minimal core.xml: {}", e));
            StageOutcome::Failed
        }
    }
}

fn synthesize(tree: &ScratchTree, report: &mut RepairReport) -> StageOutcome {
    if let Err(e) = tree.write(CORE_PART, minimal_core_properties(Utc::now())) {
        report.add_error(e.kind(), format!("Failed to write minimal core.xml: {}", e));
        return StageOutcome::Failed;
    }
    report.add_action(
        ActionKind::MetadataSynthesized,
        "Wrote minimal core.xml for package without metadata",
    );

    let registrations: [(&str, fn(&mut XmlElement) -> bool); 2] = [
        (CONTENT_TYPES, register_content_type),
        (PACKAGE_RELS, register_relationship),
    ];
    let mut outcome = StageOutcome::Repaired;
    for (key, register) in registrations {
        match edit_part(tree, key, register) {
            Ok(true) => report.add_action(
                ActionKind::MetadataSynthesized,
                format!("Registered core.xml in {}", key),
            ),
            Ok(false) => {}
            Err(e) => {
                report.add_error(
                    e.kind(),
                    format!("Could not register core.xml in {}: {}", key, e),
                );
                outcome = StageOutcome::Failed;
            }
        }
    }
    outcome
}

/// Parse a part strictly, apply `edit`, and write it back if it changed.
pub(crate) fn edit_part<F>(tree: &ScratchTree, key: &str, edit: F) -> Result<bool>
where
    F: FnOnce(&mut XmlElement) -> bool,
{
    let bytes = tree.read(key)?;
    let mut doc = xml::parse_strict(&decode_xml_bytes(&bytes)?)?;
    if !edit(&mut doc.root) {
        return Ok(false);
    }
    tree.write(key, doc.to_xml_string()?)?;
    Ok(true)
}

fn qualified(root: &XmlElement, local: &str) -> String {
    match root.prefix() {
        Some(prefix) => format!("{}:{}", prefix, local),
        None => local.to_string(),
    }
}

fn register_content_type(types: &mut XmlElement) -> bool {
    let part_name = format!("/{}", CORE_PART);
    let present = types.elements().any(|e| {
        e.local_name() == "Override"
            && e.attribute("PartName")
                .is_some_and(|p| p.eq_ignore_ascii_case(&part_name))
    });
    if present {
        return false;
    }
    let entry = XmlElement::new(qualified(types, "Override"))
        .with_attribute("PartName", part_name)
        .with_attribute("ContentType", CORE_CONTENT_TYPE);
    types.children.push(XmlNode::Element(entry));
    true
}

fn register_relationship(rels: &mut XmlElement) -> bool {
    if rels
        .elements()
        .any(|e| e.attribute("Type") == Some(CORE_REL_TYPE))
    {
        return false;
    }
    let taken: Vec<&str> = rels.elements().filter_map(|e| e.attribute("Id")).collect();
    let id = (1..)
        .map(|n| format!("rId{}", n))
        .find(|id| !taken.contains(&id.as_str()))
        .unwrap_or_default();

    let entry = XmlElement::new(qualified(rels, "Relationship"))
        .with_attribute("Id", id)
        .with_attribute("Type", CORE_REL_TYPE)
        .with_attribute("Target", CORE_PART);
    rels.children.push(XmlNode::Element(entry));
    true
}

/// Insert a default title and creator where they are absent or blank.
///
/// Blank direct children are dropped; defaults go to the front of the
/// element list. Returns the fields that were inserted.
pub(crate) fn ensure_core_fields(root: &mut XmlElement) -> Vec<&'static str> {
    let scope: Vec<(String, String)> = root
        .namespace_declarations()
        .map(|(p, u)| (p.to_string(), u.to_string()))
        .collect();
    let prefix = dc_prefix(root);

    let mut inserted = Vec::new();
    for (local, default) in [("title", DEFAULT_TITLE), ("creator", DEFAULT_CREATOR)] {
        let present = root
            .elements_with_namespace(&[])
            .into_iter()
            .any(|(el, ns)| {
                ns == Some(DC_NS) && el.local_name() == local && !el.text().trim().is_empty()
            });
        if present {
            continue;
        }

        root.remove_children(|node| match node {
            XmlNode::Element(el) => {
                el.local_name() == local
                    && namespace_of(el, &scope) == Some(DC_NS)
                    && el.text().trim().is_empty()
            }
            _ => false,
        });
        let field = XmlElement::new(format!("{}:{}", prefix, local)).with_text(default);
        root.children.insert(0, XmlNode::Element(field));
        inserted.push(local);
    }
    inserted
}

/// Prefix bound to Dublin Core on the root, declaring one if needed.
fn dc_prefix(root: &mut XmlElement) -> String {
    if let Some(prefix) = root.prefix_for_namespace(DC_NS) {
        return prefix.to_string();
    }
    let prefix = std::iter::once("dc".to_string())
        .chain((2..).map(|n| format!("dc{}", n)))
        .find(|p| root.attribute(&format!("xmlns:{}", p)).is_none())
        .unwrap_or_else(|| "dc".to_string());
    root.set_attribute(&format!("xmlns:{}", prefix), DC_NS);
    prefix
}

fn namespace_of<'a>(el: &'a XmlElement, scope: &'a [(String, String)]) -> Option<&'a str> {
    let prefix = el.prefix().unwrap_or("");
    el.namespace_declarations()
        .find(|(p, _)| *p == prefix)
        .map(|(_, u)| u)
        .or_else(|| {
            scope
                .iter()
                .find(|(p, _)| p == prefix)
                .map(|(_, u)| u.as_str())
        })
}
