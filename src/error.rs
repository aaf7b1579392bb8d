use thiserror::Error;

/// Main error type for flowdex
#[derive(Error, Debug)]
pub enum FlowdexError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors for stored columns
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed workflow document
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unknown workflow filename
    #[error("Workflow not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The index store was closed
    #[error("Index store is closed")]
    StoreClosed,

    /// Background or blocking task failure
    #[error("Task error: {0}")]
    Task(String),
}

impl FlowdexError {
    /// True for the "unknown filename" outcome surfaced to users.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FlowdexError::NotFound(_))
    }
}

/// Convenient Result type using FlowdexError
pub type Result<T> = std::result::Result<T, FlowdexError>;
