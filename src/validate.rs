//! Package validation.
//!
//! A package is valid when the strict DOCX loader opens it end to end. The
//! check is a coarse gate: [`validate`] answers yes or no, [`load`] carries
//! the first failure for callers that want to log it.

use crate::docx::DocxLoader;
use crate::error::Result;
use crate::model::Document;
use std::path::Path;

/// Load a package through the strict loader.
pub fn load(path: impl AsRef<Path>) -> Result<Document> {
    DocxLoader::open(path)?.load()
}

/// Returns true only if the package loads without any error.
pub fn validate(path: impl AsRef<Path>) -> bool {
    load(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_missing_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.docx");
        assert!(!validate(&path));
        assert_eq!(load(&path).unwrap_err().kind(), ErrorKind::Io);
    }

    #[test]
    fn test_non_zip_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.docx");
        std::fs::write(&path, "not a package").unwrap();
        assert!(!validate(&path));
        assert_eq!(load(&path).unwrap_err().kind(), ErrorKind::PackageUnreadable);
    }
}
