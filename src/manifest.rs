//! Plain-text prefix manifests defining the dataset splits.
//!
//! A manifest is newline-delimited UTF-8, one prefix per line, no header.
//! Order is significant for the training manifest (it is persisted after the
//! feature-length sort) and insignificant for valid/test.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::CorpusError;

/// Logical dataset partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    /// Training split.
    Train,
    /// Validation split.
    Valid,
    /// Test split.
    Test,
}

/// All splits in manifest-resolution order.
pub const ALL_SPLITS: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

impl Split {
    /// Manifest filename for this split.
    pub fn manifest_name(self) -> &'static str {
        match self {
            Split::Train => "train_prefixes.txt",
            Split::Valid => "valid_prefixes.txt",
            Split::Test => "test_prefixes.txt",
        }
    }

    /// Manifest path inside a target directory.
    pub fn manifest_path(self, tgt_dir: &Path) -> PathBuf {
        tgt_dir.join(self.manifest_name())
    }
}

/// Read an ordered prefix list from a manifest file.
///
/// A manifest that exists but contains nothing after stripping blank lines is
/// a data-integrity error (`CorruptManifest`), not "no split requested".
pub fn read_prefixes(path: &Path) -> Result<Vec<String>, CorpusError> {
    let contents = fs::read_to_string(path)?;
    let prefixes: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if prefixes.is_empty() {
        return Err(CorpusError::CorruptManifest(path.to_path_buf()));
    }
    Ok(prefixes)
}

/// Write a prefix list to a manifest file, one per line, preserving order.
///
/// Refuses to write an empty manifest: callers must detect "no data" earlier,
/// so an empty list here signals an upstream logic error.
pub fn write_prefixes(prefixes: &[String], path: &Path) -> Result<(), CorpusError> {
    if prefixes.is_empty() {
        return Err(CorpusError::InvalidState(format!(
            "refusing to write empty manifest '{}'",
            path.display()
        )));
    }
    let mut contents = String::new();
    for prefix in prefixes {
        contents.push_str(prefix);
        contents.push('\n');
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Read an optional prefix list, tolerating absence and emptiness.
///
/// Used for the untranscribed manifest, which is advisory rather than a split
/// definition: a missing or empty file simply means none are available.
pub fn read_optional_prefixes(path: &Path) -> Result<Option<Vec<String>>, CorpusError> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    let prefixes: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Some(prefixes))
}
