//! Document model produced by the DOCX loader.
//!
//! The loader only needs enough structure to prove that a package opens
//! the way a word processor would open it; these types also give tests a
//! convenient way to check that content survived a repair.

mod document;
mod paragraph;
mod table;

pub use document::*;
pub use paragraph::*;
pub use table::*;
