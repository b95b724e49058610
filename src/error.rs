//! Error types for the redocx library.

use serde::Serialize;
use std::io;
use thiserror::Error;

/// Result type alias for redocx operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while repairing a package.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error reading or writing a ZIP archive.
    #[error("ZIP archive error: {0}")]
    ZipArchive(String),

    /// Error parsing XML content.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Invalid or malformed data in the package.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A required package component is missing.
    #[error("Missing component: {0}")]
    MissingComponent(String),

    /// Error during text encoding conversion.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The external conversion tool is missing or unusable.
    #[error("Conversion tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The external conversion tool failed.
    #[error("Conversion failed: {0}")]
    Conversion(String),
}

impl Error {
    /// The report category this error is filed under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::ZipArchive(_) => ErrorKind::PackageUnreadable,
            Error::XmlParse(_) | Error::Encoding(_) => ErrorKind::PartParseError,
            Error::InvalidData(_) | Error::MissingComponent(_) => ErrorKind::ValidationFailed,
            Error::ToolUnavailable(_) => ErrorKind::ToolUnavailable,
            Error::Conversion(_) => ErrorKind::ConversionError,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ZipArchive(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlParse(err.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.into())
    }
}

/// Category of a failure recorded on a repair report.
///
/// Only `PackageUnreadable` ends a run early; every other kind is recorded
/// and the pipeline carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The input archive could not be opened as a zip container.
    PackageUnreadable,
    /// A single XML part could not be parsed even in recovery mode.
    PartParseError,
    /// The conversion tool is missing or unresponsive.
    ToolUnavailable,
    /// A conversion step failed or produced no output.
    ConversionError,
    /// The rebuilt package did not load.
    ValidationFailed,
    /// Filesystem failure (backup, report save, temp cleanup).
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::PackageUnreadable => "PackageUnreadable",
            ErrorKind::PartParseError => "PartParseError",
            ErrorKind::ToolUnavailable => "ToolUnavailable",
            ErrorKind::ConversionError => "ConversionError",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::Io => "IOError",
        };
        f.write_str(name)
    }
}
