//! `Catalog`: the public entry point tying the store, indexer, search engine
//! and diagram builder together.
//!
//! The store is initialized lazily on first use and closed explicitly; after
//! [`Catalog::close`] every operation fails with [`FlowdexError::StoreClosed`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use walkdir::WalkDir;

use crate::cache::DiagramCache;
use crate::classify::Classifier;
use crate::config::Config;
use crate::db::Db;
use crate::error::{FlowdexError, Result};
use crate::ingest::metadata::UNCATEGORIZED;
use crate::ingest::{spawn_reindex, IndexReport, Indexer, ReindexHandle, ReindexStatus};
use crate::search::{self, SearchPage, SearchQuery};
use crate::store::{
    IndexStats, IndexStore, WorkflowRecord, WorkflowSummary, META_CLASSIFIER_FINGERPRINT,
};
use crate::workflow::{build_diagram, parse_workflow};

/// One line of the dataset export
#[derive(Debug, Serialize)]
struct ExportLine<'a> {
    #[serde(flatten)]
    summary: &'a WorkflowSummary,
    category: &'a str,
    relative_path: &'a str,
    workflow: serde_json::Value,
}

/// Workflow catalog over one workflows directory and one index database.
///
/// Cheap to clone; clones share the store, the diagram cache and the
/// reindex tracking.
#[derive(Clone)]
pub struct Catalog {
    config: Arc<Config>,
    store: IndexStore,
    indexer: Indexer,
    classifier: Arc<Classifier>,
    diagrams: Arc<DiagramCache>,
    initialized: Arc<OnceCell<()>>,
    last_reindex: Arc<Mutex<Option<ReindexHandle>>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("workflows_dir", &self.config.workflows_dir())
            .field("db_path", &self.config.db_path())
            .finish()
    }
}

impl Catalog {
    /// Build a catalog without touching the database
    pub fn new(config: Config) -> Result<Self> {
        let classifier = Arc::new(Classifier::from_config(&config.classifier)?);
        let store = IndexStore::new(Db::new(config.db_path()));
        let indexer = Indexer::new(
            store.clone(),
            Arc::clone(&classifier),
            config.workflows_dir().to_path_buf(),
            config.index.parallelism,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            indexer,
            classifier,
            diagrams: Arc::new(DiagramCache::default()),
            initialized: Arc::new(OnceCell::new()),
            last_reindex: Arc::new(Mutex::new(None)),
        })
    }

    /// Build and initialize a catalog
    pub async fn open(config: Config) -> Result<Self> {
        let catalog = Self::new(config)?;
        catalog.initialize().await?;
        Ok(catalog)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Create or migrate the schema. Idempotent; runs at most once per catalog.
    pub async fn initialize(&self) -> Result<()> {
        ensure_initialized(&self.store, &self.classifier, &self.initialized).await
    }

    pub async fn get_stats(&self) -> Result<IndexStats> {
        self.initialize().await?;
        self.store.stats().await
    }

    pub async fn search_workflows(&self, query: &SearchQuery) -> Result<SearchPage> {
        self.initialize().await?;
        search::search_workflows(&self.store, query).await
    }

    /// Full record, or [`FlowdexError::NotFound`]
    pub async fn get_workflow_detail(&self, filename: &str) -> Result<WorkflowRecord> {
        self.initialize().await?;
        self.store.get(filename).await
    }

    pub async fn get_all_basic(&self) -> Result<Vec<WorkflowSummary>> {
        self.initialize().await?;
        self.store.list_basic().await
    }

    /// Start a reindex in the background and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reindex(&self, force: bool) -> ReindexHandle {
        let store = self.store.clone();
        let classifier = Arc::clone(&self.classifier);
        let initialized = Arc::clone(&self.initialized);
        let indexer = self.indexer.clone();

        let handle = spawn_reindex(async move {
            ensure_initialized(&store, &classifier, &initialized).await?;
            indexer.reindex(force).await
        });
        log::info!("Started reindex {} (force: {})", handle.id(), force);

        *self.last_reindex.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        handle
    }

    /// Handle of the most recently started background reindex
    pub fn last_reindex(&self) -> Option<ReindexHandle> {
        self.last_reindex
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// State of the most recently started background reindex
    pub fn reindex_status(&self) -> Option<ReindexStatus> {
        self.last_reindex().map(|handle| handle.status())
    }

    /// Reindex on the calling task and wait for the report
    pub async fn reindex_blocking(&self, force: bool) -> Result<IndexReport> {
        self.initialize().await?;
        self.indexer.reindex(force).await
    }

    /// Drop records whose file is gone; returns how many were removed
    pub async fn cleanup_missing(&self) -> Result<usize> {
        self.initialize().await?;
        self.indexer.cleanup_missing().await
    }

    /// Mermaid diagram of a workflow, memoized per content hash
    pub async fn build_diagram(&self, filename: &str) -> Result<String> {
        self.initialize().await?;
        let hash = self
            .store
            .file_hash(filename)
            .await?
            .ok_or_else(|| FlowdexError::NotFound(filename.to_string()))?;

        if let Some(diagram) = self.diagrams.get(filename, &hash) {
            log::debug!("Diagram cache hit: {}", filename);
            return Ok(diagram);
        }

        let record = self.store.get(filename).await?;
        let document = parse_workflow(record.raw_content.as_bytes())?;
        let diagram = build_diagram(&document.nodes, &document.connections);
        self.diagrams
            .put(filename.to_string(), record.file_hash, diagram.clone());
        Ok(diagram)
    }

    /// Folder labels, sorted; `Uncategorized` stands for root-level files
    pub async fn list_categories(&self) -> Result<Vec<String>> {
        self.initialize().await?;
        let mut categories: Vec<String> = self
            .store
            .distinct_folders()
            .await?
            .into_iter()
            .map(|folder| folder.unwrap_or_else(|| UNCATEGORIZED.to_string()))
            .collect();
        categories.sort();
        categories.dedup();
        if categories.is_empty() {
            categories.push(UNCATEGORIZED.to_string());
        }
        Ok(categories)
    }

    /// Filename → category label
    pub async fn category_mappings(&self) -> Result<BTreeMap<String, String>> {
        self.initialize().await?;
        self.store.category_mappings().await
    }

    pub async fn list_integrations(&self) -> Result<Vec<String>> {
        self.initialize().await?;
        self.store.list_integrations().await
    }

    /// Stored document text exactly as it was indexed
    pub async fn raw_workflow(&self, filename: &str) -> Result<String> {
        Ok(self.get_workflow_detail(filename).await?.raw_content)
    }

    /// On-disk location of an indexed workflow.
    ///
    /// Tries the stored path first, then searches the tree by basename in case
    /// the file moved since the last reindex.
    pub async fn locate_file(&self, filename: &str) -> Result<PathBuf> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.contains("..") {
            return Err(FlowdexError::InvalidInput(format!("invalid filename: {}", filename)));
        }

        let record = self.get_workflow_detail(filename).await?;
        let root = self.config.workflows_dir().to_path_buf();
        let stored = root.join(&record.relative_path);
        if stored.is_file() {
            return Ok(stored);
        }

        let wanted = filename.to_string();
        let found = tokio::task::spawn_blocking(move || find_by_basename(&root, &wanted))
            .await
            .map_err(|e| FlowdexError::Task(format!("file search failed: {}", e)))?;

        found.ok_or_else(|| {
            log::warn!("Indexed workflow missing on disk: {}", filename);
            FlowdexError::NotFound(filename.to_string())
        })
    }

    /// Write every record as one JSON object per line; returns the line count
    pub async fn export_ndjson<W: Write>(&self, mut writer: W) -> Result<usize> {
        self.initialize().await?;
        let records = self.store.list_records().await?;

        for record in &records {
            let line = ExportLine {
                summary: &record.summary,
                category: record.summary.category(),
                relative_path: &record.relative_path,
                workflow: serde_json::from_str(&record.raw_content)?,
            };
            serde_json::to_writer(&mut writer, &line)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        log::info!("Exported {} workflows", records.len());
        Ok(records.len())
    }

    /// Flush and close the store; later calls fail with `StoreClosed`
    pub async fn close(&self) -> Result<()> {
        self.diagrams.clear();
        self.store.db().close().await
    }
}

async fn ensure_initialized(
    store: &IndexStore,
    classifier: &Classifier,
    initialized: &OnceCell<()>,
) -> Result<()> {
    if store.db().is_closed() {
        return Err(FlowdexError::StoreClosed);
    }

    initialized
        .get_or_try_init(|| async {
            store.db().initialize().await?;
            // A fresh index starts out with the current classifier
            if store.meta_get(META_CLASSIFIER_FINGERPRINT).await?.is_none() && store.count().await? == 0 {
                store
                    .meta_set(META_CLASSIFIER_FINGERPRINT, classifier.fingerprint())
                    .await?;
            }
            log::debug!("Index store initialized: {}", store.db().path().display());
            Ok::<(), FlowdexError>(())
        })
        .await
        .map(|_| ())
}

fn find_by_basename(root: &Path, filename: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name().to_str() == Some(filename))
        .map(|entry| entry.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const FLOW: &str = r#"{
        "name": "Sync",
        "nodes": [
            {"name": "Every hour", "type": "n8n-nodes-base.scheduleTrigger"},
            {"name": "Sheet", "type": "n8n-nodes-base.googleSheets"}
        ],
        "connections": {"Every hour": {"main": [[{"node": "Sheet"}]]}}
    }"#;

    fn catalog(docs: &TempDir, db_dir: &TempDir) -> Catalog {
        Catalog::new(Config::for_paths(docs.path(), db_dir.path().join("index.db"))).unwrap()
    }

    #[tokio::test]
    async fn test_lazy_initialization() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        let catalog = catalog(&docs, &db_dir);

        let stats = catalog.get_stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(catalog.list_categories().await.unwrap(), vec![UNCATEGORIZED]);
    }

    #[tokio::test]
    async fn test_background_reindex_and_status() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        fs::write(docs.path().join("sync.json"), FLOW).unwrap();
        let catalog = catalog(&docs, &db_dir);

        assert!(catalog.reindex_status().is_none());
        let handle = catalog.reindex(false);
        let report = handle.wait().await.unwrap();
        assert_eq!(report.processed, 1);

        match catalog.reindex_status() {
            Some(ReindexStatus::Succeeded(r)) => assert_eq!(r, report),
            other => panic!("unexpected status: {:?}", other),
        }
        assert_eq!(catalog.last_reindex().unwrap().id(), handle.id());
    }

    #[tokio::test]
    async fn test_diagram_is_cached_and_refreshed() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        fs::write(docs.path().join("sync.json"), FLOW).unwrap();
        let catalog = catalog(&docs, &db_dir);
        catalog.reindex_blocking(false).await.unwrap();

        let first = catalog.build_diagram("sync.json").await.unwrap();
        assert!(first.contains("Every_hour --> Sheet"));
        assert_eq!(catalog.diagrams.len(), 1);
        assert_eq!(catalog.build_diagram("sync.json").await.unwrap(), first);

        fs::write(
            docs.path().join("sync.json"),
            r#"{"nodes": [{"name": "Only", "type": "x.y"}]}"#,
        )
        .unwrap();
        catalog.reindex_blocking(true).await.unwrap();
        let second = catalog.build_diagram("sync.json").await.unwrap();
        assert!(second.contains("Only[\"Only\\n(y)\"]"));

        let err = catalog.build_diagram("nope.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_locate_file_falls_back_to_search() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        fs::create_dir_all(docs.path().join("Old")).unwrap();
        fs::create_dir_all(docs.path().join("New")).unwrap();
        fs::write(docs.path().join("Old/sync.json"), FLOW).unwrap();
        let catalog = catalog(&docs, &db_dir);
        catalog.reindex_blocking(false).await.unwrap();

        let path = catalog.locate_file("sync.json").await.unwrap();
        assert!(path.ends_with("Old/sync.json"));

        fs::rename(docs.path().join("Old/sync.json"), docs.path().join("New/sync.json")).unwrap();
        let moved = catalog.locate_file("sync.json").await.unwrap();
        assert!(moved.ends_with("New/sync.json"));

        let err = catalog.locate_file("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, FlowdexError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_export_ndjson() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        fs::create_dir_all(docs.path().join("Sheets")).unwrap();
        fs::write(docs.path().join("Sheets/sync.json"), FLOW).unwrap();
        fs::write(docs.path().join("root.json"), r#"{"nodes": []}"#).unwrap();
        let catalog = catalog(&docs, &db_dir);
        catalog.reindex_blocking(false).await.unwrap();

        let mut out = Vec::new();
        assert_eq!(catalog.export_ndjson(&mut out).await.unwrap(), 2);

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["filename"], "root.json");
        assert_eq!(lines[0]["category"], UNCATEGORIZED);
        assert_eq!(lines[1]["category"], "Sheets");
        assert_eq!(lines[1]["trigger_type"], "Scheduled");
        assert_eq!(lines[1]["workflow"]["name"], "Sync");
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let docs = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        let catalog = catalog(&docs, &db_dir);
        catalog.initialize().await.unwrap();
        catalog.close().await.unwrap();

        assert!(matches!(catalog.get_stats().await, Err(FlowdexError::StoreClosed)));
        assert!(matches!(
            catalog.search_workflows(&SearchQuery::new()).await,
            Err(FlowdexError::StoreClosed)
        ));
        let err = catalog.reindex(false).wait().await.unwrap_err();
        assert!(matches!(err, FlowdexError::Task(_)));
    }
}
