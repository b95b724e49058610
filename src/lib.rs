//! # redocx
//!
//! Best-effort repair of corrupted Microsoft Word (DOCX) packages.
//!
//! A repair run backs up the input, unpacks it into a scratch directory,
//! fixes what it can part by part (core properties, malformed XML, custom
//! XML data), rebuilds the package and checks that it opens. If it still
//! does not, the package is round-tripped through pandoc. Every step is
//! recorded on a report that is saved next to the input.
//!
//! ## Quick Start
//!
//! ```no_run
//! use redocx::repair_file;
//!
//! let report = repair_file("broken.docx", None);
//! println!("repaired: {:?}", report.final_docx_ok());
//! println!("{}", report.summary().to_json()?);
//! # Ok::<(), serde_json::Error>(())
//! ```
//!
//! ## Configured Runs
//!
//! ```no_run
//! use redocx::{Capabilities, RepairOptions, Repairer};
//!
//! let options = RepairOptions::new()
//!     .with_output("fixed.docx")
//!     .with_synthesized_metadata(true);
//! let report = Repairer::new(options, Capabilities::detect()).repair("broken.docx");
//! for error in report.errors() {
//!     eprintln!("{}: {}", error.kind, error.msg);
//! }
//! ```
//!
//! ## Validation Only
//!
//! ```no_run
//! let ok = redocx::validate("document.docx");
//! let doc = redocx::load("document.docx")?;
//! println!("{} paragraphs", doc.paragraphs().count());
//! # Ok::<(), redocx::Error>(())
//! ```
//!
//! ## Features
//!
//! - `pandoc` (default): find pandoc on the `PATH` for the conversion fallback
//! - `ffi`: C-ABI bindings for foreign language integration

pub mod container;
pub mod convert;
pub mod detect;
pub mod docx;
pub mod error;
pub mod model;
pub mod options;
pub mod package;
pub mod repair;
pub mod report;
pub mod validate;
pub mod xml;

#[cfg(feature = "ffi")]
pub mod ffi;

// Re-exports
pub use container::{OoxmlContainer, Relationship, Relationships};
pub use convert::{Converter, Pandoc, Version};
pub use detect::FormatType;
pub use error::{Error, ErrorKind, Result};
pub use model::{Block, Cell, Document, Metadata, Paragraph, Row, Table, TextRun};
pub use options::{Capabilities, RepairOptions};
pub use package::ScratchTree;
pub use repair::{repair_file, sanitize, FallbackState, Repairer, SanitizeResult, StageOutcome};
pub use report::{ActionKind, Entry, FinalReport, RepairReport, RepairSummary};
pub use validate::{load, validate};
