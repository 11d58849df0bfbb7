//! Oplog Core - resumable tailing of an append-only operation log.
//!
//! A consumer picks a resume point with [`ResumePointResolver`], opens a
//! [`TailingStream`] after it, and drives the stream's pull loop until it asks
//! the stream to stop. Storage is reached through the [`LogStore`] trait;
//! [`OpLog`] is the sled-backed implementation.

pub mod clock;
pub mod config;
pub mod error;
pub mod oplog;
pub mod resolver;
pub mod store;
pub mod tailing;

pub use config::TailConfig;
pub use error::{Error, HandlerError};
pub use oplog::{OpLog, OpLogCursor};
pub use resolver::ResumePointResolver;
pub use store::{CursorOptions, LogStore, SortOrder, TimestampFilter};
pub use tailing::{CursorHandle, StreamExit, StreamState, StreamSummary, TailingStream};

/// Re-export record types.
pub use oplog_proto as proto;
