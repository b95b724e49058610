//! Package I/O: the scratch tree a run repairs in place, and the zip
//! extraction and rebuild around it.
//!
//! Every part is addressed by its package-relative key with forward slashes
//! (e.g., `word/_rels/document.xml.rels`), whatever the host separator is.

use crate::container::CONTENT_TYPES;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

/// Prefix of scratch directories created under the system temp dir.
pub const SCRATCH_PREFIX: &str = "docx_repair_";

/// Suffix marking a top-level directory as set aside: kept on disk for
/// inspection but never written into a rebuilt package.
pub const QUARANTINE_SUFFIX: &str = ".removed";

/// Outcome of extracting an archive into a scratch tree.
#[derive(Debug, Clone, Default)]
pub struct ExtractSummary {
    /// Number of files written
    pub files: usize,
    /// Entries that could not be extracted, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Ephemeral directory mirroring a package's internal layout.
///
/// Owned by exactly one repair run. The directory is removed by
/// [`ScratchTree::close`], or on drop if the run ends early.
#[derive(Debug)]
pub struct ScratchTree {
    dir: TempDir,
}

impl ScratchTree {
    /// Create a fresh, uniquely named scratch directory.
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
        Ok(Self { dir })
    }

    /// Create a scratch tree holding the contents of `archive`.
    pub fn extract(archive: impl AsRef<Path>) -> Result<(Self, ExtractSummary)> {
        let tree = Self::create()?;
        let summary = tree.extract_from(archive)?;
        Ok((tree, summary))
    }

    /// Write every entry of `archive` into this tree, preserving relative paths.
    ///
    /// Fails with [`Error::ZipArchive`] when the file cannot be opened as a
    /// zip container. Individual entries that cannot be read, or whose names
    /// would escape the tree, are skipped and listed in the summary.
    pub fn extract_from(&self, archive: impl AsRef<Path>) -> Result<ExtractSummary> {
        let file = File::open(archive.as_ref())?;
        let mut zip = zip::ZipArchive::new(io::BufReader::new(file))?;
        let mut summary = ExtractSummary::default();

        for i in 0..zip.len() {
            let mut entry = match zip.by_index(i) {
                Ok(entry) => entry,
                Err(e) => {
                    summary.skipped.push((format!("#{}", i), e.to_string()));
                    continue;
                }
            };
            let name = entry.name().to_string();

            let Some(relative) = entry.enclosed_name() else {
                tracing::warn!(entry = %name, "skipping entry with unsafe path");
                summary
                    .skipped
                    .push((name, "entry path escapes the package root".to_string()));
                continue;
            };
            let target = self.root().join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let written = File::create(&target).and_then(|out| {
                let mut out = BufWriter::new(out);
                io::copy(&mut entry, &mut out)?;
                out.flush()
            });
            match written {
                Ok(()) => {
                    tracing::debug!(entry = %name, "extracted");
                    summary.files += 1;
                }
                Err(e) => {
                    let _ = fs::remove_file(&target);
                    summary.skipped.push((name, e.to_string()));
                }
            }
        }

        Ok(summary)
    }

    /// Root directory of the tree.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Filesystem path of a part key.
    pub fn path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|c| !c.is_empty())
            .fold(self.root().to_path_buf(), |path, c| path.join(c))
    }

    /// Check if a part (file or directory) exists.
    pub fn exists(&self, key: &str) -> bool {
        self.path(key).exists()
    }

    /// Read a part's raw bytes.
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        fs::read(self.path(key)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::MissingComponent(key.to_string()),
            _ => Error::Io(e),
        })
    }

    /// Overwrite (or create) a part.
    pub fn write(&self, key: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Move a part or directory to another key.
    ///
    /// Returns `false` when `from` does not exist.
    pub fn relocate(&self, from: &str, to: &str) -> Result<bool> {
        let source = self.path(from);
        if !source.exists() {
            return Ok(false);
        }
        let dest = self.path(to);
        if dest.exists() {
            if dest.is_dir() {
                fs::remove_dir_all(&dest)?;
            } else {
                fs::remove_file(&dest)?;
            }
        }
        fs::rename(source, dest)?;
        Ok(true)
    }

    /// Keys of every file that belongs in a rebuilt package, sorted.
    pub fn files(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(self.root()).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = key_for(self.root(), entry.path()) else {
                continue;
            };
            if !is_quarantined(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Remove the tree from disk.
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

/// True when `key` lives under a set-aside top-level directory.
pub fn is_quarantined(key: &str) -> bool {
    key.split('/')
        .next()
        .is_some_and(|first| first.ends_with(QUARANTINE_SUFFIX) && key.contains('/'))
}

fn key_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Write the scratch tree into a new zip archive at `output`.
///
/// `[Content_Types].xml` is written first, the remaining parts in sorted
/// order. Set-aside directories are left out. Any existing file at
/// `output` is replaced. Returns the number of entries written.
pub fn rebuild(tree: &ScratchTree, output: impl AsRef<Path>) -> Result<usize> {
    let output = output.as_ref();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut keys = tree.files()?;
    if let Some(pos) = keys.iter().position(|k| k == CONTENT_TYPES) {
        let content_types = keys.remove(pos);
        keys.insert(0, content_types);
    }

    let file = File::create(output)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for key in &keys {
        let data = tree.read(key)?;
        zip.start_file(key.as_str(), options).map_err(write_failed)?;
        zip.write_all(&data)?;
    }

    let mut writer = zip.finish().map_err(write_failed)?;
    writer.flush()?;
    tracing::debug!(output = %output.display(), entries = keys.len(), "package rebuilt");
    Ok(keys.len())
}

/// Zip errors on the write side are output failures, never an unreadable input.
fn write_failed(err: ZipError) -> Error {
    match err {
        ZipError::Io(e) => Error::Io(e),
        other => Error::Io(io::Error::other(other)),
    }
}

/// Path of the backup copy: `<input>.backup.<YYYYMMDDHHMMSS>` (UTC).
pub fn backup_path(input: &Path, now: DateTime<Utc>) -> PathBuf {
    append_to_file_name(input, &format!(".backup.{}", now.format("%Y%m%d%H%M%S")))
}

/// Copy `input` next to itself as a timestamped backup.
pub fn backup_file(input: &Path) -> Result<PathBuf> {
    let dest = backup_path(input, Utc::now());
    fs::copy(input, &dest)?;
    Ok(dest)
}

/// Default repaired output: `<dir>/<stem>.repaired.docx`.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}.repaired.docx", stem))
}

/// Report location: the input path with its extension replaced.
pub fn report_path(input: &Path) -> PathBuf {
    input.with_extension("repair_report.json")
}

fn append_to_file_name(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
