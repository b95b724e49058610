//! External document conversion.
//!
//! The fallback stage needs a tool that turns a package into an interchange
//! format and back. [`Converter`] is the seam; [`Pandoc`] drives the pandoc
//! binary through [`std::process::Command`].

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Minimum supported pandoc major version.
const MIN_PANDOC_MAJOR: u32 = 2;

/// A tool version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A whole-document conversion tool.
///
/// Conversions have no partial results: a call either produces `output` or
/// returns an error.
pub trait Converter: Send + Sync {
    /// Tool name used in log messages.
    fn name(&self) -> &str;

    /// Check the tool is usable and report its version.
    fn version(&self) -> Result<Version>;

    /// Convert `input` into `format`, writing the result to `output`.
    fn convert_file(&self, input: &Path, format: &str, output: &Path) -> Result<()>;
}

/// The pandoc command-line converter.
#[derive(Debug, Clone)]
pub struct Pandoc {
    program: PathBuf,
}

impl Pandoc {
    /// Locate `pandoc` on the `PATH`.
    #[cfg(feature = "pandoc")]
    pub fn discover() -> Option<Self> {
        which::which("pandoc").ok().map(Self::with_program)
    }

    /// Locate `pandoc` on the `PATH`. Always `None` without the `pandoc` feature.
    #[cfg(not(feature = "pandoc"))]
    pub fn discover() -> Option<Self> {
        None
    }

    /// Use a specific pandoc executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path of the executable.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Converter for Pandoc {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn version(&self) -> Result<Version> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| {
                Error::ToolUnavailable(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(Error::ToolUnavailable(format!(
                "{} --version exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = extract_version(&stdout).ok_or_else(|| {
            Error::ToolUnavailable(format!(
                "could not parse pandoc version from: {}",
                stdout.trim()
            ))
        })?;

        if version.major < MIN_PANDOC_MAJOR {
            return Err(Error::ToolUnavailable(format!(
                "pandoc {} or above is required, found {}",
                MIN_PANDOC_MAJOR, version
            )));
        }
        Ok(version)
    }

    fn convert_file(&self, input: &Path, format: &str, output: &Path) -> Result<()> {
        tracing::debug!(
            input = %input.display(),
            format,
            output = %output.display(),
            "running pandoc"
        );

        let result = Command::new(&self.program)
            .arg(input)
            .arg("-t")
            .arg(format)
            .arg("-o")
            .arg(output)
            .output()
            .map_err(|e| {
                Error::ToolUnavailable(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Conversion(format!(
                "pandoc exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Find the first `major.minor[.patch]` token in `--version` output.
fn extract_version(output: &str) -> Option<Version> {
    output
        .lines()
        .flat_map(str::split_whitespace)
        .find_map(|token| parse_version_token(token.trim_start_matches('v')))
}

fn parse_version_token(token: &str) -> Option<Version> {
    let token = token.trim_end_matches([',', ')']);
    let mut parts = token.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some(Version {
        major,
        minor,
        patch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version_standard_format() {
        let version = extract_version("pandoc 3.1.2\nFeatures: +server +lua").unwrap();
        assert_eq!(
            version,
            Version {
                major: 3,
                minor: 1,
                patch: 2
            }
        );
    }

    #[test]
    fn test_extract_version_variants() {
        assert_eq!(extract_version("pandoc.exe 2.19").unwrap().minor, 19);
        assert_eq!(extract_version("pandoc v3.0.1").unwrap().major, 3);
        assert_eq!(extract_version("pandoc (version 2.5)").unwrap().major, 2);
        assert!(extract_version("pandoc unknown").is_none());
    }

    #[test]
    fn test_version_display() {
        let v = Version {
            major: 2,
            minor: 0,
            patch: 0,
        };
        assert_eq!(v.to_string(), "2.0.0");
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let pandoc = Pandoc::with_program("/nonexistent/bin/pandoc");
        assert!(matches!(pandoc.version(), Err(Error::ToolUnavailable(_))));

        let dir = tempfile::tempdir().unwrap();
        let result = pandoc.convert_file(
            &dir.path().join("in.docx"),
            "markdown",
            &dir.path().join("out.md"),
        );
        assert!(matches!(result, Err(Error::ToolUnavailable(_))));
    }
}
