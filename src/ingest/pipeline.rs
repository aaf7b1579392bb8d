//! The indexing pipeline: cleanup, discovery, change detection, parallel
//! parse + classify, and batched writes.

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::classify::Classifier;
use crate::error::{FlowdexError, Result};
use crate::ingest::incremental::{classify_files, find_missing};
use crate::ingest::metadata::hash_bytes;
use crate::ingest::walker::{discover_files, FileMetadata};
use crate::store::{IndexStore, WorkflowEntry, BATCH_SIZE, META_CLASSIFIER_FINGERPRINT, META_LAST_INDEXED};
use crate::workflow::parse_workflow;

/// Counters for one reindex run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Workflow files found under the root
    pub discovered: usize,
    /// Records written
    pub processed: usize,
    /// Unchanged files left alone
    pub skipped: usize,
    /// Files that could not be read or parsed
    pub errors: usize,
    /// Records dropped because their file is gone
    pub removed: usize,
    /// Whether every file was reprocessed
    pub forced: bool,
}

/// Keeps the index in step with the workflows directory
#[derive(Debug, Clone)]
pub struct Indexer {
    store: IndexStore,
    classifier: Arc<Classifier>,
    root: PathBuf,
    parallelism: usize,
}

impl Indexer {
    pub fn new(store: IndexStore, classifier: Arc<Classifier>, root: PathBuf, parallelism: usize) -> Self {
        Self {
            store,
            classifier,
            root,
            parallelism: parallelism.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete records whose file no longer exists; returns how many were removed
    pub async fn cleanup_missing(&self) -> Result<usize> {
        let indexed = self.store.indexed_paths().await?;
        let root = self.root.clone();
        let missing = blocking(move || Ok(find_missing(&root, &indexed))).await?;

        for filename in &missing {
            log::info!("Removing missing workflow: {}", filename);
        }
        self.store.delete_many(missing).await
    }

    /// Bring the index up to date with the workflows directory.
    ///
    /// Unreadable or malformed documents are counted and logged; they never
    /// abort the run. A classifier change since the last run forces a full
    /// reprocess so every record carries the same classification.
    pub async fn reindex(&self, force: bool) -> Result<IndexReport> {
        let start = Instant::now();
        let mut report = IndexReport {
            removed: self.cleanup_missing().await?,
            ..IndexReport::default()
        };

        report.forced = force || self.classifier_changed().await?;

        let root = self.root.clone();
        let files = blocking(move || discover_files(&root)).await?;
        report.discovered = files.len();

        let stored = self.store.signatures().await?;
        let classification = classify_files(files, &stored, report.forced);
        report.skipped = classification.unchanged_files.len();
        log::info!(
            "Reindex plan: {} to process ({} new, {} modified), {} unchanged",
            classification.pending(),
            classification.new_files.len(),
            classification.modified_files.len(),
            classification.unchanged_files.len()
        );

        let pending = classification
            .new_files
            .into_iter()
            .chain(classification.modified_files);

        let classifier = Arc::clone(&self.classifier);
        let mut loaded = stream::iter(pending.map(|file| {
            let classifier = Arc::clone(&classifier);
            async move {
                let path = file.relative_path.clone();
                (path, blocking(move || load_entry(file, &classifier)).await)
            }
        }))
        .buffered(self.parallelism);

        let mut batch: Vec<WorkflowEntry> = Vec::with_capacity(BATCH_SIZE);
        while let Some((path, result)) = loaded.next().await {
            match result {
                Ok(entry) => {
                    log::debug!("Parsed {}", path);
                    batch.push(entry);
                    if batch.len() >= BATCH_SIZE {
                        report.processed += self.store.upsert_batch(std::mem::take(&mut batch)).await?;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    log::warn!("Failed to index {}: {}", path, e);
                }
            }
        }
        report.processed += self.store.upsert_batch(batch).await?;

        self.store
            .meta_set(META_CLASSIFIER_FINGERPRINT, self.classifier.fingerprint())
            .await?;
        self.store
            .meta_set(META_LAST_INDEXED, &crate::store::format_timestamp(Utc::now()))
            .await?;

        log::info!(
            "Reindex complete in {:?}: {} discovered, {} processed, {} skipped, {} errors, {} removed",
            start.elapsed(),
            report.discovered,
            report.processed,
            report.skipped,
            report.errors,
            report.removed
        );
        Ok(report)
    }

    async fn classifier_changed(&self) -> Result<bool> {
        let changed = match self.store.meta_get(META_CLASSIFIER_FINGERPRINT).await? {
            Some(stored) => stored != self.classifier.fingerprint(),
            None => self.store.count().await? > 0,
        };
        if changed {
            log::info!("Classifier changed since last run; reclassifying every workflow");
        }
        Ok(changed)
    }
}

/// Read, parse and classify one file
fn load_entry(file: FileMetadata, classifier: &Classifier) -> Result<WorkflowEntry> {
    let raw = std::fs::read(&file.absolute_path)?;
    let document = parse_workflow(&raw)?;
    let metadata = classifier.classify(&document);
    let file_hash = hash_bytes(&raw);
    let raw_content = String::from_utf8(raw)
        .map_err(|e| FlowdexError::Parse(format!("document is not valid UTF-8: {}", e)))?;

    Ok(WorkflowEntry::new(&file, document, metadata, raw_content, file_hash))
}

async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FlowdexError::Task(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ComplexityPolicy, TriggerType, Vocabulary};
    use crate::db::Db;
    use std::fs;
    use tempfile::TempDir;

    const WEBHOOK_FLOW: &str = r#"{
        "name": "Webhook to Slack",
        "nodes": [
            {"name": "Hook", "type": "n8n-nodes-base.webhook"},
            {"name": "Post", "type": "n8n-nodes-base.slack"}
        ],
        "connections": {"Hook": {"main": [[{"node": "Post"}]]}}
    }"#;

    async fn setup(root: &Path, db_dir: &Path) -> Indexer {
        let db = Db::new(db_dir.join("index.db"));
        db.initialize().await.unwrap();
        Indexer::new(
            IndexStore::new(db),
            Arc::new(Classifier::builtin()),
            root.to_path_buf(),
            4,
        )
    }

    #[tokio::test]
    async fn test_reindex_counts_and_skips() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        fs::create_dir_all(docs.path().join("Slack")).unwrap();
        fs::write(docs.path().join("Slack/hook.json"), WEBHOOK_FLOW).unwrap();
        fs::write(docs.path().join("broken.json"), "{not json").unwrap();
        fs::write(docs.path().join("no_nodes.json"), r#"{"name": "x"}"#).unwrap();

        let indexer = setup(docs.path(), db_dir.path()).await;
        let report = indexer.reindex(false).await.unwrap();
        assert_eq!(report.discovered, 3);
        assert_eq!(report.processed, 1);
        assert_eq!(report.errors, 2);
        assert_eq!(report.skipped, 0);
        assert!(!report.forced);

        let record = indexer.store.get("hook.json").await.unwrap();
        assert_eq!(record.summary.trigger_type, TriggerType::Webhook);
        assert_eq!(record.summary.folder.as_deref(), Some("Slack"));

        let again = indexer.reindex(false).await.unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(again.skipped, 1);
        // Broken files are retried every run
        assert_eq!(again.errors, 2);

        let forced = indexer.reindex(true).await.unwrap();
        assert_eq!(forced.processed, 1);
        assert_eq!(forced.skipped, 0);
    }

    #[tokio::test]
    async fn test_cleanup_missing() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        fs::write(docs.path().join("a.json"), WEBHOOK_FLOW).unwrap();
        fs::write(docs.path().join("b.json"), WEBHOOK_FLOW).unwrap();

        let indexer = setup(docs.path(), db_dir.path()).await;
        indexer.reindex(false).await.unwrap();

        fs::remove_file(docs.path().join("a.json")).unwrap();
        assert_eq!(indexer.cleanup_missing().await.unwrap(), 1);
        assert!(indexer.store.get("a.json").await.unwrap_err().is_not_found());
        assert_eq!(indexer.cleanup_missing().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_classifier_change_forces_reprocess() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        fs::write(docs.path().join("a.json"), WEBHOOK_FLOW).unwrap();

        let indexer = setup(docs.path(), db_dir.path()).await;
        indexer.reindex(false).await.unwrap();

        let stricter = Classifier::new(
            Vocabulary::builtin(),
            ComplexityPolicy { simple_max_nodes: 1, medium_max_nodes: 2, integration_escalation: 6 },
        );
        let reclassifying = Indexer::new(
            indexer.store.clone(),
            Arc::new(stricter),
            docs.path().to_path_buf(),
            2,
        );
        let report = reclassifying.reindex(false).await.unwrap();
        assert!(report.forced);
        assert_eq!(report.processed, 1);

        let record = reclassifying.store.get("a.json").await.unwrap();
        assert_eq!(record.summary.complexity, crate::classify::Complexity::Medium);

        let settled = reclassifying.reindex(false).await.unwrap();
        assert!(!settled.forced);
        assert_eq!(settled.skipped, 1);
    }

    #[tokio::test]
    async fn test_large_tree_spans_batches() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        for i in 0..(BATCH_SIZE + 5) {
            fs::write(docs.path().join(format!("flow_{:04}.json", i)), WEBHOOK_FLOW).unwrap();
        }

        let indexer = setup(docs.path(), db_dir.path()).await;
        let report = indexer.reindex(false).await.unwrap();
        assert_eq!(report.processed, BATCH_SIZE + 5);
        assert_eq!(indexer.store.count().await.unwrap(), BATCH_SIZE + 5);
    }
}
