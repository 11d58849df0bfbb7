//! CLI error types.

use thiserror::Error;

/// Errors surfaced by `oplog` commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Oplog error.
    #[error("{0}")]
    Core(#[from] oplog_core::Error),

    /// Storage error while opening the database.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON input.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// A background task failed to complete.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
