//! Index store: reads and writes of workflow records on top of [`Db`].
//!
//! Every write runs in one transaction, so readers never observe a partially
//! written record or a record whose integration rows are out of sync.

mod record;

pub use record::{IndexStats, StoredSignature, WorkflowEntry, WorkflowRecord, WorkflowSummary};

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::collections::{BTreeMap, HashMap};

use crate::classify::{Complexity, TriggerType};
use crate::db::Db;
use crate::error::{FlowdexError, Result};
use crate::ingest::metadata::{category_label, is_legacy_filename, UNCATEGORIZED};
use crate::ingest::FileSignature;
pub(crate) use record::{format_timestamp, parse_timestamp};
use record::{record_from_row, summary_from_row, RECORD_COLUMNS, SUMMARY_COLUMNS};

/// Records written per transaction by [`IndexStore::upsert_batch`]
pub const BATCH_SIZE: usize = 100;

/// Row filters shared by `query` and its total count.
///
/// Every field narrows the result set; the default matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowFilters {
    /// Lowercased tokens; each must occur in the record's search text
    pub text_tokens: Vec<String>,
    pub trigger_type: Option<String>,
    pub complexity: Option<String>,
    pub active_only: bool,
    pub exclude_legacy: bool,
    /// Folder label; `Uncategorized` selects root-level files
    pub folder: Option<String>,
}

impl WorkflowFilters {
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        for token in &self.text_tokens {
            clauses.push("instr(search_text, ?) > 0");
            values.push(Value::Text(token.clone()));
        }
        if let Some(trigger) = &self.trigger_type {
            clauses.push("trigger_type = ?");
            values.push(Value::Text(trigger.clone()));
        }
        if let Some(complexity) = &self.complexity {
            clauses.push("complexity = ?");
            values.push(Value::Text(complexity.clone()));
        }
        if self.active_only {
            clauses.push("active = 1");
        }
        if self.exclude_legacy {
            clauses.push("legacy = 0");
        }
        match self.folder.as_deref() {
            // Root-level files and a literal `Uncategorized/` folder share the label
            Some(UNCATEGORIZED) => {
                clauses.push("(folder IS NULL OR folder = ?)");
                values.push(Value::Text(UNCATEGORIZED.to_string()));
            }
            Some(folder) => {
                clauses.push("folder = ?");
                values.push(Value::Text(folder.to_string()));
            }
            None => {}
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// Handle to the workflow index
#[derive(Debug, Clone)]
pub struct IndexStore {
    db: Db,
}

impl IndexStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Insert or replace one record
    pub async fn upsert(&self, entry: WorkflowEntry) -> Result<()> {
        self.upsert_batch(vec![entry]).await.map(|_| ())
    }

    /// Insert or replace records, [`BATCH_SIZE`] per transaction.
    ///
    /// `created_at` survives re-indexing; `updated_at` only moves when the
    /// content hash changes.
    pub async fn upsert_batch(&self, entries: Vec<WorkflowEntry>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        self.db
            .with_connection(move |conn| {
                let mut count = 0;
                for batch in entries.chunks(BATCH_SIZE) {
                    let tx = conn.transaction()?;
                    let now = format_timestamp(Utc::now());
                    for entry in batch {
                        write_entry(&tx, entry, &now)?;
                    }
                    tx.commit()?;
                    count += batch.len();
                    log::debug!("Committed batch of {} records", batch.len());
                }
                Ok(count)
            })
            .await
    }

    /// Remove a record; unknown filenames are a no-op
    pub async fn delete(&self, filename: &str) -> Result<bool> {
        let removed = self.delete_many(vec![filename.to_string()]).await?;
        Ok(removed > 0)
    }

    /// Remove records in one transaction, returning how many existed
    pub async fn delete_many(&self, filenames: Vec<String>) -> Result<usize> {
        if filenames.is_empty() {
            return Ok(0);
        }

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut stmt = tx.prepare("DELETE FROM workflows WHERE filename = ?1")?;
                    for filename in &filenames {
                        removed += stmt.execute(params![filename])?;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
    }

    /// Full record for a filename, or [`FlowdexError::NotFound`]
    pub async fn get(&self, filename: &str) -> Result<WorkflowRecord> {
        let filename = filename.to_string();
        self.db
            .with_connection(move |conn| {
                let sql = format!("SELECT {} FROM workflows WHERE filename = ?1", RECORD_COLUMNS);
                conn.query_row(&sql, params![filename], record_from_row)
                    .optional()?
                    .ok_or(FlowdexError::NotFound(filename))
            })
            .await
    }

    /// Every record without raw content, ordered by filename
    pub async fn list_basic(&self) -> Result<Vec<WorkflowSummary>> {
        self.db
            .with_connection(|conn| {
                let sql = format!("SELECT {} FROM workflows ORDER BY filename ASC", SUMMARY_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], summary_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Every full record, ordered by filename
    pub async fn list_records(&self) -> Result<Vec<WorkflowRecord>> {
        self.db
            .with_connection(|conn| {
                let sql = format!("SELECT {} FROM workflows ORDER BY filename ASC", RECORD_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], record_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// One page of filtered records plus the size of the whole filtered set.
    ///
    /// Both reads happen in the same transaction so the total matches the page.
    pub async fn query(
        &self,
        filters: &WorkflowFilters,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<WorkflowSummary>, usize)> {
        let (where_clause, values) = filters.where_clause();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;

                let count_sql = format!("SELECT COUNT(*) FROM workflows {}", where_clause);
                let total: i64 =
                    tx.query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))?;

                let page_sql = format!(
                    "SELECT {} FROM workflows {} ORDER BY filename ASC LIMIT ? OFFSET ?",
                    SUMMARY_COLUMNS, where_clause
                );
                let mut page_values = values;
                page_values.push(Value::Integer(to_i64(limit)));
                page_values.push(Value::Integer(to_i64(offset)));

                let rows = tx
                    .prepare(&page_sql)?
                    .query_map(params_from_iter(page_values.iter()), summary_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                tx.commit()?;

                Ok((rows, total.max(0) as usize))
            })
            .await
    }

    /// Number of indexed records
    pub async fn count(&self) -> Result<usize> {
        self.db
            .with_connection(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM workflows", [], |row| row.get(0))?;
                Ok(n.max(0) as usize)
            })
            .await
    }

    /// Distinct folders, `None` standing for root-level files
    pub async fn distinct_folders(&self) -> Result<Vec<Option<String>>> {
        self.db
            .with_connection(|conn| {
                let mut stmt =
                    conn.prepare("SELECT DISTINCT folder FROM workflows ORDER BY folder ASC")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, Option<String>>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Filename → category label for every record
    pub async fn category_mappings(&self) -> Result<BTreeMap<String, String>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT filename, folder FROM workflows")?;
                let mut rows = stmt.query([])?;
                let mut map = BTreeMap::new();
                while let Some(row) = rows.next()? {
                    let filename: String = row.get(0)?;
                    let folder: Option<String> = row.get(1)?;
                    map.insert(filename, category_label(folder.as_deref()).to_string());
                }
                Ok(map)
            })
            .await
    }

    /// Sorted distinct integration labels across the index
    pub async fn list_integrations(&self) -> Result<Vec<String>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT integration FROM workflow_integrations ORDER BY integration ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.db
            .with_connection(|conn| {
                let tx = conn.transaction()?;
                let stats = read_stats(&tx)?;
                tx.commit()?;
                Ok(stats)
            })
            .await
    }

    /// Stored change-detection signatures keyed by filename
    pub async fn signatures(&self) -> Result<HashMap<String, StoredSignature>> {
        self.db
            .with_connection(|conn| {
                let mut stmt =
                    conn.prepare("SELECT filename, relative_path, file_size, file_mtime FROM workflows")?;
                let mut rows = stmt.query([])?;
                let mut map = HashMap::new();
                while let Some(row) = rows.next()? {
                    let filename: String = row.get(0)?;
                    map.insert(
                        filename,
                        StoredSignature {
                            relative_path: row.get(1)?,
                            signature: FileSignature {
                                size: row.get::<_, i64>(2)?.max(0) as u64,
                                mtime_ns: row.get(3)?,
                            },
                        },
                    );
                }
                Ok(map)
            })
            .await
    }

    /// `(filename, relative_path)` of every record
    pub async fn indexed_paths(&self) -> Result<Vec<(String, String)>> {
        self.db
            .with_connection(|conn| {
                let mut stmt =
                    conn.prepare("SELECT filename, relative_path FROM workflows ORDER BY filename")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Content hash of a record, `None` when not indexed
    pub async fn file_hash(&self, filename: &str) -> Result<Option<String>> {
        let filename = filename.to_string();
        self.db
            .with_connection(move |conn| {
                let hash = conn
                    .query_row(
                        "SELECT file_hash FROM workflows WHERE filename = ?1",
                        params![filename],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(hash)
            })
            .await
    }

    pub async fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.db
            .with_connection(move |conn| meta_get(conn, &key))
            .await
    }

    pub async fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO index_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, format_timestamp(Utc::now())],
                )?;
                Ok(())
            })
            .await
    }
}

/// Index-meta key holding the classifier fingerprint
pub const META_CLASSIFIER_FINGERPRINT: &str = "classifier_fingerprint";
/// Index-meta key holding the completion time of the last reindex
pub const META_LAST_INDEXED: &str = "last_indexed";

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn meta_get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

fn write_entry(tx: &Transaction<'_>, entry: &WorkflowEntry, now: &str) -> Result<()> {
    let integrations = serde_json::to_string(&entry.metadata.integrations)?;
    let tags = serde_json::to_string(&entry.tags)?;

    tx.execute(
        r#"
        INSERT INTO workflows (
            filename, folder, relative_path, name, description, active,
            trigger_type, complexity, node_count, integrations, tags, legacy,
            search_text, raw_content, file_hash, file_size, file_mtime,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
        ON CONFLICT(filename) DO UPDATE SET
            folder = excluded.folder,
            relative_path = excluded.relative_path,
            name = excluded.name,
            description = excluded.description,
            active = excluded.active,
            trigger_type = excluded.trigger_type,
            complexity = excluded.complexity,
            node_count = excluded.node_count,
            integrations = excluded.integrations,
            tags = excluded.tags,
            legacy = excluded.legacy,
            search_text = excluded.search_text,
            raw_content = excluded.raw_content,
            updated_at = CASE
                WHEN workflows.file_hash = excluded.file_hash THEN workflows.updated_at
                ELSE excluded.updated_at
            END,
            file_hash = excluded.file_hash,
            file_size = excluded.file_size,
            file_mtime = excluded.file_mtime
        "#,
        params![
            entry.filename,
            entry.folder,
            entry.relative_path,
            entry.name,
            entry.description,
            entry.active,
            entry.metadata.trigger_type.as_str(),
            entry.metadata.complexity.as_str(),
            to_i64(entry.metadata.node_count),
            integrations,
            tags,
            is_legacy_filename(&entry.filename),
            entry.search_text(),
            entry.raw_content,
            entry.file_hash,
            i64::try_from(entry.signature.size).unwrap_or(i64::MAX),
            entry.signature.mtime_ns,
            now,
        ],
    )?;

    tx.execute(
        "DELETE FROM workflow_integrations WHERE filename = ?1",
        params![entry.filename],
    )?;
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO workflow_integrations (filename, integration) VALUES (?1, ?2)",
    )?;
    for integration in &entry.metadata.integrations {
        stmt.execute(params![entry.filename, integration])?;
    }

    Ok(())
}

fn read_stats(conn: &Connection) -> Result<IndexStats> {
    let mut stats = IndexStats::default();

    let (total, active, total_nodes): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(active), 0), COALESCE(SUM(node_count), 0) FROM workflows",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    stats.total = total.max(0) as usize;
    stats.active = active.max(0) as usize;
    stats.inactive = stats.total - stats.active.min(stats.total);
    stats.total_nodes = total_nodes.max(0) as usize;

    stats.by_trigger = TriggerType::ALL.iter().map(|t| (t.to_string(), 0)).collect();
    stats.by_complexity = Complexity::ALL.iter().map(|c| (c.to_string(), 0)).collect();

    let grouped = [
        ("trigger_type", &mut stats.by_trigger),
        ("complexity", &mut stats.by_complexity),
    ];
    for (column, counts) in grouped {
        let sql = format!("SELECT {col}, COUNT(*) FROM workflows GROUP BY {col}", col = column);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            counts.insert(key, n.max(0) as usize);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT integration, COUNT(*) FROM workflow_integrations GROUP BY integration",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let integration: String = row.get(0)?;
        let n: i64 = row.get(1)?;
        stats.by_integration.insert(integration, n.max(0) as usize);
    }
    stats.unique_integrations = stats.by_integration.len();

    let last_indexed = match meta_get(conn, META_LAST_INDEXED)? {
        Some(value) => Some(value),
        None => conn.query_row("SELECT MAX(updated_at) FROM workflows", [], |row| {
            row.get::<_, Option<String>>(0)
        })?,
    };
    stats.last_indexed = last_indexed
        .map(|value| parse_timestamp(0, &value))
        .transpose()?;

    Ok(stats)
}
