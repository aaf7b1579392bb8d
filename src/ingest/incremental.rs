//! Incremental indexing: skip unchanged files by comparing filesystem
//! signatures with the ones stored in the index.
//!
//! Size and modification time are read from metadata during discovery, so
//! unchanged files are never opened on a refresh.

use std::collections::HashMap;
use std::path::Path;

use crate::ingest::FileMetadata;
use crate::store::StoredSignature;

/// Result of classifying discovered files against the index.
#[derive(Debug, Default)]
pub struct FileClassification {
    /// Filenames not present in the index.
    pub new_files: Vec<FileMetadata>,
    /// Indexed, but with a different signature or location.
    pub modified_files: Vec<FileMetadata>,
    /// Indexed with the same signature (skipped unless forced).
    pub unchanged_files: Vec<FileMetadata>,
}

impl FileClassification {
    /// Number of files that need to be read and parsed
    pub fn pending(&self) -> usize {
        self.new_files.len() + self.modified_files.len()
    }
}

/// Classify discovered files into new, modified, or unchanged.
///
/// With `force`, nothing is considered unchanged.
pub fn classify_files(
    files: Vec<FileMetadata>,
    stored: &HashMap<String, StoredSignature>,
    force: bool,
) -> FileClassification {
    let mut classification = FileClassification::default();

    for file in files {
        match stored.get(&file.filename) {
            None => classification.new_files.push(file),
            Some(existing) if force || !is_up_to_date(&file, existing) => {
                classification.modified_files.push(file)
            }
            Some(_) => classification.unchanged_files.push(file),
        }
    }

    classification
}

fn is_up_to_date(file: &FileMetadata, stored: &StoredSignature) -> bool {
    stored.signature == file.signature && stored.relative_path == file.relative_path
}

/// Filenames whose stored relative path no longer exists under `root`.
pub fn find_missing(root: &Path, indexed: &[(String, String)]) -> Vec<String> {
    indexed
        .iter()
        .filter(|(_, relative_path)| !root.join(relative_path).is_file())
        .map(|(filename, _)| filename.clone())
        .collect()
}
