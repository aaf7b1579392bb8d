use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::classify::{Complexity, DerivedMetadata, TriggerType};
use crate::ingest::metadata::category_label;
use crate::ingest::FileSignature;
use crate::workflow::WorkflowDocument;

/// Everything needed to write one workflow into the index
#[derive(Debug, Clone)]
pub struct WorkflowEntry {
    pub filename: String,
    pub folder: Option<String>,
    pub relative_path: String,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub tags: Vec<String>,
    pub metadata: DerivedMetadata,
    pub raw_content: String,
    pub file_hash: String,
    pub signature: FileSignature,
}

impl WorkflowEntry {
    pub fn new(
        file: &crate::ingest::FileMetadata,
        document: WorkflowDocument,
        metadata: DerivedMetadata,
        raw_content: String,
        file_hash: String,
    ) -> Self {
        Self {
            filename: file.filename.clone(),
            folder: file.folder.clone(),
            relative_path: file.relative_path.clone(),
            name: document.name,
            description: document.description,
            active: document.active,
            tags: document.tags,
            metadata,
            raw_content,
            file_hash,
            signature: file.signature,
        }
    }

    /// Lowercased haystack for text search
    pub(crate) fn search_text(&self) -> String {
        format!("{} {} {}", self.name, self.description, self.filename).to_lowercase()
    }
}

/// Indexed workflow without its raw content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub filename: String,
    pub folder: Option<String>,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub trigger_type: TriggerType,
    pub complexity: Complexity,
    pub node_count: usize,
    pub integrations: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSummary {
    /// Folder label, `Uncategorized` for root-level files
    pub fn category(&self) -> &str {
        category_label(self.folder.as_deref())
    }
}

/// Full indexed workflow, as returned by detail lookups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRecord {
    #[serde(flatten)]
    pub summary: WorkflowSummary,
    pub relative_path: String,
    pub raw_content: String,
    pub file_hash: String,
    pub file_size: u64,
    pub file_mtime_ns: i64,
}

/// Signature stored for a filename, compared against the filesystem on reindex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSignature {
    pub relative_path: String,
    pub signature: FileSignature,
}

/// Aggregate statistics over the whole index
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub by_trigger: BTreeMap<String, usize>,
    pub by_complexity: BTreeMap<String, usize>,
    pub by_integration: BTreeMap<String, usize>,
    pub total_nodes: usize,
    pub unique_integrations: usize,
    pub last_indexed: Option<DateTime<Utc>>,
}

pub(crate) const SUMMARY_COLUMNS: &str = "filename, folder, name, description, active, \
     trigger_type, complexity, node_count, integrations, tags, created_at, updated_at";

pub(crate) const RECORD_COLUMNS: &str = "filename, folder, name, description, active, \
     trigger_type, complexity, node_count, integrations, tags, created_at, updated_at, \
     relative_path, raw_content, file_hash, file_size, file_mtime";

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn json_list(idx: usize, value: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(value).map_err(|e| conversion_error(idx, e))
}

/// Map a row selected with [`SUMMARY_COLUMNS`]
pub(crate) fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowSummary> {
    let trigger: String = row.get(5)?;
    let complexity: String = row.get(6)?;
    let integrations: String = row.get(8)?;
    let tags: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(WorkflowSummary {
        filename: row.get(0)?,
        folder: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        trigger_type: trigger.parse().map_err(|e| conversion_error(5, e))?,
        complexity: complexity.parse().map_err(|e| conversion_error(6, e))?,
        node_count: row.get::<_, i64>(7)?.max(0) as usize,
        integrations: json_list(8, &integrations)?,
        tags: json_list(9, &tags)?,
        created_at: parse_timestamp(10, &created_at)?,
        updated_at: parse_timestamp(11, &updated_at)?,
    })
}

/// Map a row selected with [`RECORD_COLUMNS`]
pub(crate) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowRecord> {
    Ok(WorkflowRecord {
        summary: summary_from_row(row)?,
        relative_path: row.get(12)?,
        raw_content: row.get(13)?,
        file_hash: row.get(14)?,
        file_size: row.get::<_, i64>(15)?.max(0) as u64,
        file_mtime_ns: row.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let text = format_timestamp(ts);
        assert_eq!(text, "2024-05-01T12:30:00.000000Z");
        assert_eq!(parse_timestamp(0, &text).unwrap(), ts);
        assert!(parse_timestamp(0, "yesterday").is_err());
    }
}
