//! Operation log record types and serialization.
//!
//! # Modules
//!
//! - [`timestamp`] - Logical timestamps ordering the log
//! - [`record`] - Log records and operation kinds
//! - [`error`] - Protocol error types
//!
//! # Serialization
//!
//! All types derive `rkyv::Archive`, `rkyv::Serialize` and `rkyv::Deserialize`
//! for storage, and serde traits for JSON output:
//!
//! ```ignore
//! use oplog_proto::{LogRecord, LogicalTimestamp};
//!
//! let record = LogRecord::noop(LogicalTimestamp::new(1, 0));
//! let bytes = record.to_bytes()?;
//! let decoded = LogRecord::from_bytes(&bytes)?;
//! ```

pub mod error;
pub mod record;
pub mod timestamp;

pub use error::Error;
pub use record::{LogRecord, OpKind};
pub use timestamp::LogicalTimestamp;

/// On-disk format version of serialized log records.
pub const FORMAT_VERSION: u32 = 1;
