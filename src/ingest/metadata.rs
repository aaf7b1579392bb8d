use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::Result;

/// Category label shown for files that sit directly in the workflows root.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Compute SHA256 hash of file contents
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    Ok(hash_bytes(&content))
}

/// SHA256 of an in-memory buffer, lowercase hex
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Extract the folder (category) from a relative file path.
///
/// The folder is the first path segment; root-level files have none. Unlike a
/// slug, the segment keeps its original spelling since it is shown to users.
///
/// Handles both forward slashes and backslashes.
pub fn extract_folder(relative_path: &str) -> Option<String> {
    let normalized = relative_path.replace('\\', "/");
    let mut segments = normalized.split('/').filter(|s| !s.is_empty());

    let first = segments.next()?;
    // A single segment is the file itself
    segments.next()?;

    let folder = first.trim();
    (!folder.is_empty()).then(|| folder.to_string())
}

/// Display label for an optional folder.
pub fn category_label(folder: Option<&str>) -> &str {
    folder.unwrap_or(UNCATEGORIZED)
}

/// Legacy files carry a numeric import prefix, e.g. `0001_old_flow.json`.
pub fn is_legacy_filename(filename: &str) -> bool {
    static LEGACY: OnceLock<Regex> = OnceLock::new();
    LEGACY
        .get_or_init(|| Regex::new(r"^\d+_").expect("Invalid regex pattern"))
        .is_match(filename)
}
