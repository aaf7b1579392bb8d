//! Background reindex runs with observable state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{FlowdexError, Result};
use crate::ingest::pipeline::IndexReport;

/// Lifecycle of a background reindex
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReindexStatus {
    Pending,
    Running,
    Succeeded(IndexReport),
    Failed { error: String },
}

impl ReindexStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ReindexStatus::Succeeded(_) | ReindexStatus::Failed { .. })
    }
}

/// Handle to a reindex running on a spawned task.
///
/// Cheap to clone; every clone observes the same run.
#[derive(Debug, Clone)]
pub struct ReindexHandle {
    id: Uuid,
    started_at: DateTime<Utc>,
    status: watch::Receiver<ReindexStatus>,
}

impl ReindexHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current state, without waiting
    pub fn status(&self) -> ReindexStatus {
        self.status.borrow().clone()
    }

    /// Wait for the run to finish and return its report
    pub async fn wait(&self) -> Result<IndexReport> {
        let mut status = self.status.clone();
        loop {
            match &*status.borrow_and_update() {
                ReindexStatus::Succeeded(report) => return Ok(*report),
                ReindexStatus::Failed { error } => return Err(FlowdexError::Task(error.clone())),
                ReindexStatus::Pending | ReindexStatus::Running => {}
            }
            if status.changed().await.is_err() {
                // Sender gone: the final value, if any, is already visible
                return match &*status.borrow() {
                    ReindexStatus::Succeeded(report) => Ok(*report),
                    ReindexStatus::Failed { error } => Err(FlowdexError::Task(error.clone())),
                    _ => Err(FlowdexError::Task(
                        "reindex task ended without reporting".to_string(),
                    )),
                };
            }
        }
    }
}

/// Run `work` on a spawned task and track it through a [`ReindexHandle`].
///
/// Must be called from within a tokio runtime.
pub fn spawn_reindex<F>(work: F) -> ReindexHandle
where
    F: Future<Output = Result<IndexReport>> + Send + 'static,
{
    let (tx, rx) = watch::channel(ReindexStatus::Pending);
    let id = Uuid::new_v4();

    tokio::spawn(async move {
        tx.send_replace(ReindexStatus::Running);
        let status = match work.await {
            Ok(report) => {
                log::info!("Reindex {} succeeded", id);
                ReindexStatus::Succeeded(report)
            }
            Err(e) => {
                log::error!("Reindex {} failed: {}", id, e);
                ReindexStatus::Failed { error: e.to_string() }
            }
        };
        tx.send_replace(status);
    });

    ReindexHandle {
        id,
        started_at: Utc::now(),
        status: rx,
    }
}
