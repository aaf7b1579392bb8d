pub mod walker;
pub mod metadata;
pub mod incremental;
pub mod pipeline;
pub mod task;

pub use walker::{FileMetadata, FileSignature, discover_files};
pub use incremental::{FileClassification, classify_files, find_missing};
pub use metadata::{compute_file_hash, extract_folder, is_legacy_filename, UNCATEGORIZED};
pub use pipeline::{IndexReport, Indexer};
pub use task::{ReindexHandle, ReindexStatus, spawn_reindex};
