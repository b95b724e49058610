//! The repair pipeline.

use super::clean::clean_structure;
use super::fallback::{ConversionFallback, FallbackState};
use super::metadata::repair_metadata;
use super::sanitize::sanitize_parts;
use crate::container::CONTENT_TYPES;
use crate::detect::{self, FormatType};
use crate::error::ErrorKind;
use crate::options::{Capabilities, RepairOptions};
use crate::package::{self, ScratchTree};
use crate::report::{ActionKind, FinalReport, RepairReport};
use crate::validate;
use std::path::{Path, PathBuf};

/// Runs the repair stages over one input at a time.
///
/// # Example
///
/// ```no_run
/// use redocx::{Capabilities, RepairOptions, Repairer};
///
/// let repairer = Repairer::new(RepairOptions::default(), Capabilities::detect());
/// let report = repairer.repair("broken.docx");
/// println!("ok: {:?}", report.final_docx_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Repairer {
    options: RepairOptions,
    capabilities: Capabilities,
}

impl Repairer {
    pub fn new(options: RepairOptions, capabilities: Capabilities) -> Self {
        Self {
            options,
            capabilities,
        }
    }

    pub fn options(&self) -> &RepairOptions {
        &self.options
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Where the repaired package for `input` is written.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        self.options
            .output
            .clone()
            .unwrap_or_else(|| package::default_output_path(input))
    }

    /// Repair `input`, returning the persisted report.
    ///
    /// Only a missing input or an unreadable archive ends a run early; every
    /// other problem is recorded and the remaining stages still run.
    pub fn repair(&self, input: impl AsRef<Path>) -> FinalReport {
        let input = input.as_ref();
        let mut report = RepairReport::new(input);

        if !input.is_file() {
            report.add_error(
                ErrorKind::Io,
                format!("Input file not found: {}", input.display()),
            );
            return report.unsaved();
        }
        let report_path = package::report_path(input);

        match package::backup_file(input) {
            Ok(backup) => {
                report.set_backup_path(&backup);
                report.add_action(
                    ActionKind::BackupCreated,
                    format!("Backed up original file to {}", backup.display()),
                );
            }
            Err(e) => report.add_error(
                e.kind(),
                format!("Failed to back up {}: {}", input.display(), e),
            ),
        }

        let tree = match ScratchTree::create() {
            Ok(tree) => tree,
            Err(e) => {
                report.add_error(e.kind(), format!("Failed to create temp dir: {}", e));
                return report.finish(&report_path);
            }
        };
        report.add_action(
            ActionKind::ScratchCreated,
            format!("Created temp dir {}", tree.root().display()),
        );

        match tree.extract_from(input) {
            Ok(summary) => {
                for (entry, reason) in &summary.skipped {
                    report.add_error(
                        ErrorKind::Io,
                        format!("Failed to extract {}: {}", entry, reason),
                    );
                }
                report.add_action(ActionKind::Extracted, "Extracted docx zip to temp dir");
            }
            Err(e) => {
                let detail = detect::describe_non_zip(input)
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default();
                report.add_error(
                    e.kind(),
                    format!("Failed to unzip {}: {}{}", input.display(), e, detail),
                );
                // Dropping the tree removes the scratch directory.
                return report.finish(&report_path);
            }
        }
        log_format(&tree);

        let outcome = repair_metadata(&tree, &mut report, &self.options, &self.capabilities);
        tracing::debug!(stage = "metadata", ?outcome);
        let outcome = sanitize_parts(&tree, &mut report, &self.options, &self.capabilities);
        tracing::debug!(stage = "sanitize", ?outcome);
        let outcome = clean_structure(&tree, &mut report, &self.options);
        tracing::debug!(stage = "clean", ?outcome);

        let output = self.output_path(input);
        match package::rebuild(&tree, &output) {
            Ok(entries) => {
                tracing::debug!(entries, "rebuilt");
                report.add_action(
                    ActionKind::Rebuilt,
                    format!("Rebuilt docx as {}", output.display()),
                );
            }
            Err(e) => report.add_error(
                ErrorKind::Io,
                format!("Failed to rebuild {}: {}", output.display(), e),
            ),
        }

        report.add_action(
            ActionKind::ValidationStarted,
            "Attempting to validate repaired docx.",
        );
        let mut ok = check(&output, &mut report);
        if !ok {
            report.add_action(
                ActionKind::FallbackStarted,
                "Validation failed - attempting pandoc roundtrip fallback.",
            );
            let state =
                ConversionFallback::new(&self.capabilities).run(&tree, &output, &mut report);
            if state == FallbackState::Succeeded {
                report.add_action(ActionKind::FallbackSucceeded, "Pandoc fallback succeeded.");
                report.add_action(
                    ActionKind::ValidationStarted,
                    "Attempting to validate pandoc rebuilt docx.",
                );
                ok = check(&output, &mut report);
            } else {
                report.add_error(
                    ErrorKind::ValidationFailed,
                    "Pandoc fallback also failed. Final docx may still be corrupt.",
                );
            }
        }

        report.set_final_docx(&output);
        report.set_final_docx_ok(ok);
        let report = report.finish(&report_path);

        let scratch = tree.root().display().to_string();
        match tree.close() {
            Ok(()) => tracing::debug!(dir = %scratch, "removed temp dir"),
            Err(e) => tracing::warn!(dir = %scratch, "failed to remove temp dir: {}", e),
        }
        report
    }
}

/// Validate `output`, recording the outcome.
fn check(output: &Path, report: &mut RepairReport) -> bool {
    match validate::load(output) {
        Ok(_) => {
            report.add_action(
                ActionKind::ValidationPassed,
                "Repaired document validated successfully.",
            );
            true
        }
        Err(e) => {
            report.add_error(
                ErrorKind::ValidationFailed,
                format!("Failed to open repaired docx: {}", e),
            );
            false
        }
    }
}

fn log_format(tree: &ScratchTree) {
    let names = tree.files().unwrap_or_default();
    let content_types = tree
        .read(CONTENT_TYPES)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    let format = detect::detect_format(content_types.as_deref(), &names);
    if format == FormatType::Docx {
        tracing::debug!(%format, parts = names.len(), "package extracted");
    } else {
        tracing::warn!(%format, "package does not look like a Word document");
    }
}

/// Repair `input` with detected capabilities, writing to `output` or the
/// default `<stem>.repaired.docx`.
pub fn repair_file(input: impl AsRef<Path>, output: Option<&Path>) -> FinalReport {
    let mut options = RepairOptions::default();
    if let Some(output) = output {
        options = options.with_output(output);
    }
    Repairer::new(options, Capabilities::detect()).repair(input)
}
