//! Conversion fallback.
//!
//! When the rebuilt package does not validate, it is pushed through an
//! external converter (package → markdown → package), which produces a
//! structurally clean document at the cost of some formatting.

use crate::convert::Converter;
use crate::error::{Error, ErrorKind, Result};
use crate::options::Capabilities;
use crate::package::{self, ScratchTree};
use crate::report::{ActionKind, RepairReport};
use std::fs;
use std::path::{Path, PathBuf};

/// Interchange format used for the round trip.
pub const INTERCHANGE_FORMAT: &str = "markdown";

/// Package format requested on the way back.
pub const PACKAGE_FORMAT: &str = "docx";

/// States of the fallback.
///
/// `NotAttempted` moves to `ToolUnavailable` or `Converting`, and
/// `Converting` ends in `Succeeded` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    NotAttempted,
    ToolUnavailable,
    Converting,
    Succeeded,
    Failed,
}

impl FallbackState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FallbackState::ToolUnavailable | FallbackState::Succeeded | FallbackState::Failed
        )
    }
}

/// Deletes a working file when dropped.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "failed to remove temp file: {}", e);
        }
    }
}

/// Working file next to `output`: `<stem><suffix>`.
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{}{}", stem, suffix))
}

/// One run of the fallback state machine.
pub struct ConversionFallback<'a> {
    capabilities: &'a Capabilities,
    state: FallbackState,
}

impl<'a> ConversionFallback<'a> {
    pub fn new(capabilities: &'a Capabilities) -> Self {
        Self {
            capabilities,
            state: FallbackState::NotAttempted,
        }
    }

    pub fn state(&self) -> FallbackState {
        self.state
    }

    fn transition(&mut self, next: FallbackState) {
        tracing::debug!(from = ?self.state, to = ?next, "fallback transition");
        self.state = next;
    }

    /// Round-trip `tree` through the converter and, on success, replace
    /// `output` with the result. `output` is not touched otherwise.
    pub fn run(
        mut self,
        tree: &ScratchTree,
        output: &Path,
        report: &mut RepairReport,
    ) -> FallbackState {
        let Some(converter) = self.capabilities.converter.clone() else {
            report.add_error(
                ErrorKind::ToolUnavailable,
                "No conversion tool available; pandoc fallback disabled.",
            );
            self.transition(FallbackState::ToolUnavailable);
            return self.state;
        };

        match converter.version() {
            Ok(version) => report.add_action(
                ActionKind::ConverterFound,
                format!("{} {} found.", converter.name(), version),
            ),
            Err(e) => {
                report.add_error(
                    ErrorKind::ToolUnavailable,
                    format!("{} not available: {}", converter.name(), e),
                );
                self.transition(FallbackState::ToolUnavailable);
                return self.state;
            }
        }

        self.transition(FallbackState::Converting);
        let next = match round_trip(converter.as_ref(), tree, output, report) {
            Ok(()) => FallbackState::Succeeded,
            Err(e) => {
                let kind = match e.kind() {
                    ErrorKind::ToolUnavailable | ErrorKind::Io => e.kind(),
                    _ => ErrorKind::ConversionError,
                };
                report.add_error(kind, format!("Pandoc roundtrip failed: {}", e));
                FallbackState::Failed
            }
        };
        self.transition(next);
        self.state
    }
}

fn round_trip(
    converter: &dyn Converter,
    tree: &ScratchTree,
    output: &Path,
    report: &mut RepairReport,
) -> Result<()> {
    let temp_package = TempFile::new(sibling(output, ".pandoc_temp.docx"));
    let interchange = TempFile::new(sibling(output, ".pandoc_temp.md"));
    let rebuilt = TempFile::new(sibling(output, ".pandoc_rebuilt.docx"));

    package::rebuild(tree, &temp_package.path)?;
    report.add_action(
        ActionKind::Rebuilt,
        format!("Rebuilt docx as {}", temp_package.path.display()),
    );

    report.add_action(ActionKind::Converting, "Running pandoc docx -> md");
    converter.convert_file(&temp_package.path, INTERCHANGE_FORMAT, &interchange.path)?;
    if !interchange.path.exists() {
        return Err(Error::Conversion(format!(
            "no output written to {}",
            interchange.path.display()
        )));
    }
    report.add_action(
        ActionKind::Converting,
        format!("Pandoc conversion to markdown saved at {}", interchange.path.display()),
    );

    report.add_action(
        ActionKind::Converting,
        "Running pandoc md -> docx to rebuild structure",
    );
    converter.convert_file(&interchange.path, PACKAGE_FORMAT, &rebuilt.path)?;
    if !rebuilt.path.exists() {
        return Err(Error::Conversion(format!(
            "no output written to {}",
            rebuilt.path.display()
        )));
    }

    if fs::rename(&rebuilt.path, output).is_err() {
        fs::copy(&rebuilt.path, output)?;
    }
    report.add_action(
        ActionKind::FallbackSucceeded,
        format!(
            "Pandoc rebuilt document replaced repaired docx: {}",
            output.display()
        ),
    );
    Ok(())
}
