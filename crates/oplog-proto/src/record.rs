//! Operation log record types.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::timestamp::LogicalTimestamp;

/// Kind of operation an oplog record describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// A document was inserted.
    Insert,
    /// A document was updated.
    Update,
    /// A document was deleted.
    Delete,
    /// A namespace-level command (create, drop, rename).
    Command,
    /// A no-op marker, used to advance the log without a mutation.
    Noop,
}

/// A single entry read from the operation log.
///
/// Only the timestamp is meaningful to the tailing machinery; the rest of the
/// record is carried through untouched.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct LogRecord {
    /// Logical time of the operation.
    pub timestamp: LogicalTimestamp,
    /// Kind of operation.
    pub op: OpKind,
    /// Namespace (e.g. `db.collection`) the operation applies to.
    pub namespace: String,
    /// Identifier of the affected document.
    pub document_id: String,
    /// Document body, if the operation carries one.
    pub body: Option<Vec<u8>>,
}

impl LogRecord {
    /// Create a new record.
    pub fn new(
        timestamp: LogicalTimestamp,
        op: OpKind,
        namespace: impl Into<String>,
        document_id: impl Into<String>,
        body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            timestamp,
            op,
            namespace: namespace.into(),
            document_id: document_id.into(),
            body,
        }
    }

    /// Create a no-op record at the given timestamp.
    pub fn noop(timestamp: LogicalTimestamp) -> Self {
        Self::new(timestamp, OpKind::Noop, "", "", None)
    }

    /// Serialize this record with rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record produced by [`LogRecord::to_bytes`].
    ///
    /// The input does not need to be aligned; it is copied into an aligned
    /// buffer before validation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let archived = rkyv::access::<ArchivedLogRecord, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        rkyv::deserialize::<LogRecord, rkyv::rancor::Error>(archived)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}
