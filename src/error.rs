//! Error types for Kanbot
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Kanbot
#[derive(Debug, Error)]
pub enum KanbotError {
    /// Kan API / data source error (transient, workspace skipped for the tick)
    #[error("Source error: {0}")]
    Source(String),

    /// Reminder ledger error (fail-closed, suppresses the affected send)
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// LLM classifier error (falls back to heuristic, never cached)
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Telegram dispatch error (retry-safe, no ledger record written)
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Invalid or missing configuration
    #[error("Config error: {0}")]
    Config(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Kanbot operations
pub type Result<T> = std::result::Result<T, KanbotError>;
