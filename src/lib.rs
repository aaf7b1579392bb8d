pub mod config;
pub mod error;
pub mod db;
pub mod workflow;
pub mod classify;
pub mod store;
pub mod ingest;
pub mod search;
pub mod cache;
pub mod catalog;

pub use catalog::Catalog;
pub use classify::{Classifier, Complexity, DerivedMetadata, TriggerType};
pub use config::Config;
pub use error::{FlowdexError, Result};
pub use ingest::{IndexReport, ReindexHandle, ReindexStatus};
pub use search::{SearchPage, SearchQuery};
pub use store::{IndexStats, WorkflowRecord, WorkflowSummary};
pub use workflow::{build_diagram, parse_workflow, WorkflowDocument};
