use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::{FlowdexError, Result};
use crate::ingest::metadata::extract_folder;

/// A workflow file found under the workflows root
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Basename; the unique key of the index
    pub filename: String,
    pub folder: Option<String>,
    /// Forward-slash path under the root
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub signature: FileSignature,
}

/// Cheap change-detection signature taken from filesystem metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub size: u64,
    /// Modification time as nanoseconds since the Unix epoch
    pub mtime_ns: i64,
}

impl FileSignature {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Result<Self> {
        Ok(Self {
            size: metadata.len(),
            mtime_ns: system_time_to_nanos(metadata.modified()?),
        })
    }
}

fn system_time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}

/// Discover every `*.json` workflow under `root`, recursively.
///
/// The walk is sorted so results are deterministic. Filenames are the index
/// key, so when the same basename appears in several folders only the last
/// one in walk order is kept and the others are reported in the log.
pub fn discover_files(root: &Path) -> Result<Vec<FileMetadata>> {
    let mut files: Vec<FileMetadata> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !entry.file_type().is_file() {
            continue;
        }

        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|s| s.to_str()).map(str::to_string) else {
            log::warn!("Skipping non-UTF-8 file name: {}", path.display());
            continue;
        };

        let metadata = std::fs::metadata(path)?;

        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| {
                FlowdexError::Config(format!(
                    "Failed to compute relative path for: {}",
                    path.display()
                ))
            })?
            .to_string_lossy()
            .replace('\\', "/");

        let file = FileMetadata {
            folder: extract_folder(&relative_path),
            filename: filename.clone(),
            relative_path,
            absolute_path: path.to_path_buf(),
            signature: FileSignature::from_metadata(&metadata)?,
        };

        match seen.get(&filename) {
            Some(&idx) => {
                log::warn!(
                    "Duplicate filename {}: {} replaces {}",
                    filename,
                    file.relative_path,
                    files[idx].relative_path
                );
                files[idx] = file;
            }
            None => {
                seen.insert(filename, files.len());
                files.push(file);
            }
        }
    }

    log::info!("Discovered {} workflow files in {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("Slack/nested")).unwrap();
        fs::write(root.join("root.json"), "{}").unwrap();
        fs::write(root.join("Slack/alerts.json"), "{}").unwrap();
        fs::write(root.join("Slack/nested/deep.JSON"), "{}").unwrap();
        fs::write(root.join("README.md"), "# Docs").unwrap();
        fs::write(root.join("Slack/notes.txt"), "plain").unwrap();

        let files = discover_files(root).unwrap();

        assert_eq!(files.len(), 3);
        let root_file = files.iter().find(|f| f.filename == "root.json").unwrap();
        assert_eq!(root_file.folder, None);
        assert_eq!(root_file.relative_path, "root.json");

        let deep = files.iter().find(|f| f.filename == "deep.JSON").unwrap();
        assert_eq!(deep.folder.as_deref(), Some("Slack"));
        assert_eq!(deep.relative_path, "Slack/nested/deep.JSON");
        assert_eq!(deep.signature.size, 2);
    }

    #[test]
    fn test_discover_files_empty() {
        let temp_dir = TempDir::new().unwrap();
        let files = discover_files(temp_dir.path()).unwrap();
        assert_eq!(files.len(), 0);
    }

    #[test]
    fn test_duplicate_filenames_keep_last_in_walk_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("A")).unwrap();
        fs::create_dir_all(root.join("B")).unwrap();
        fs::write(root.join("A/same.json"), "{}").unwrap();
        fs::write(root.join("B/same.json"), "{ }").unwrap();

        let files = discover_files(root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "B/same.json");
        assert_eq!(files[0].folder.as_deref(), Some("B"));
    }

    #[test]
    fn test_walk_order_is_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["c.json", "a.json", "b.json"] {
            fs::write(root.join(name), "{}").unwrap();
        }
        let names: Vec<_> = discover_files(root).unwrap().into_iter().map(|f| f.filename).collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
    }
}
