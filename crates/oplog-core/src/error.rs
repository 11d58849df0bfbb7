//! Core error types.

use oplog_proto::LogicalTimestamp;
use thiserror::Error;

/// Boxed error raised by a record handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Core tailing errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] oplog_proto::Error),

    /// Key decoding error.
    #[error("invalid key format")]
    InvalidKey,

    /// The log store or tail settings are not usable for tailing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `open` was called while a cursor is already open on this stream.
    #[error("a cursor is already open on this stream")]
    AlreadyOpen,

    /// No cursor is open on this stream.
    #[error("no cursor is open on this stream")]
    NotOpen,

    /// A streaming loop is already running on this stream.
    #[error("a streaming loop is already running on this stream")]
    AlreadyStreaming,

    /// The handle does not name the currently open cursor.
    #[error("stale cursor handle: open cursor is {expected}, got {actual}")]
    StaleCursor { expected: u64, actual: u64 },

    /// An append would move the log backwards in logical time.
    #[error("out of order append: last timestamp {last}, attempted {attempted}")]
    OutOfOrder {
        last: LogicalTimestamp,
        attempted: LogicalTimestamp,
    },

    /// The record handler failed. The inner error is the handler's own.
    #[error("record handler failed: {0}")]
    Handler(HandlerError),
}

impl Error {
    /// Borrow the handler's error, if this is a handler failure.
    pub fn handler_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Handler(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}
