//! DOCX (Word) document loader.
//!
//! Opens a package the way a word processor does: through the package
//! relationships to the main document part, its related parts and the core
//! properties. Loading succeeds only if every step does, which makes the
//! loader the pass/fail gate for a repaired package.

mod loader;
pub mod styles;

pub use loader::DocxLoader;
#[cfg(test)]
pub(crate) use loader::parse_core_properties;
pub use styles::StyleMap;

use crate::xml::XmlElement;

/// Value of the `w:val` attribute, whatever prefix it is written with.
pub(crate) fn val_attr(el: &XmlElement) -> Option<&str> {
    el.attributes
        .iter()
        .find(|(k, _)| k == "val" || k.ends_with(":val"))
        .map(|(_, v)| v.as_str())
}
