//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A timestamp string was not of the form `epoch:ordinal`.
    #[error("invalid timestamp {0:?}: expected `epoch:ordinal`")]
    InvalidTimestamp(String),
}
