//! Persistent operation log backed by sled.
//!
//! Records are stored under a monotonically increasing append sequence, which
//! is the log's natural order. Logical timestamps are non-decreasing along that
//! order but not unique, so every ordering question is answered by the
//! sequence, never by the timestamp.
//!
//! Sequences are dense from 1 and timestamps never decrease along them, so the
//! records matching any [`TimestampFilter`] form one contiguous sequence range.
//! Point queries and cursor seeks find that range by binary search, costing
//! O(log n) point reads. sled reads are synchronous and run on the calling
//! task; they are served from sled's page cache in the common case.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use oplog_proto::{LogRecord, LogicalTimestamp, OpKind, FORMAT_VERSION};
use parking_lot::Mutex;
use sled::{Db, Tree};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::clock;
use crate::error::Error;
use crate::store::{CursorOptions, LogStore, SortOrder, TimestampFilter};

const RECORDS_TREE: &str = "oplog";
const META_TREE: &str = "oplog_meta";
const FORMAT_KEY: &[u8] = b"format_version";

/// Last appended position.
#[derive(Debug, Clone, Copy, Default)]
struct Tail {
    seq: u64,
    timestamp: Option<LogicalTimestamp>,
}

/// Append-only operation log stored in a sled database.
pub struct OpLog {
    /// Records keyed by big-endian append sequence.
    tree: Tree,
    /// Format marker identifying the database as an oplog.
    meta: Tree,
    /// Serializes appends so sequence order and timestamp order agree.
    tail: Mutex<Tail>,
    /// Raised after every append to wake waiting cursors.
    appended: Notify,
    next_cursor_id: AtomicU64,
    open_cursors: AtomicUsize,
}

/// A tailable cursor over an [`OpLog`].
#[derive(Debug)]
pub struct OpLogCursor {
    id: u64,
    filter: TimestampFilter,
    /// Sequence of the last record scanned; 0 before the first record.
    position: u64,
    options: CursorOptions,
}

impl OpLogCursor {
    /// Identifier assigned when the cursor was opened.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl OpLog {
    /// Open or create an oplog in the given sled database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        let log = Self::open_existing(db)?;
        if log.meta.get(FORMAT_KEY)?.is_none() {
            log.meta.insert(FORMAT_KEY, FORMAT_VERSION.to_be_bytes().to_vec())?;
        }
        Ok(log)
    }

    /// Open the oplog trees without stamping the format marker.
    ///
    /// Use this when attaching to a database that must already be an oplog;
    /// [`LogStore::check_tailable`] then rejects anything else.
    pub fn open_existing(db: &Db) -> Result<Self, Error> {
        let tree = db.open_tree(RECORDS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        let tail = Self::load_tail(&tree)?;

        Ok(Self {
            tree,
            meta,
            tail: Mutex::new(tail),
            appended: Notify::new(),
            next_cursor_id: AtomicU64::new(1),
            open_cursors: AtomicUsize::new(0),
        })
    }

    /// Load the last appended position, or the empty position.
    fn load_tail(tree: &Tree) -> Result<Tail, Error> {
        match tree.last()? {
            Some((key, value)) => Ok(Tail {
                seq: decode_seq(&key)?,
                timestamp: Some(LogRecord::from_bytes(&value)?.timestamp),
            }),
            None => Ok(Tail::default()),
        }
    }

    /// Append a record and return its sequence number.
    ///
    /// The record's timestamp must not be lower than the last appended
    /// timestamp. Equal timestamps are accepted.
    pub fn append(&self, record: LogRecord) -> Result<u64, Error> {
        let mut tail = self.tail.lock();
        let seq = self.append_locked(&mut tail, &record)?;
        drop(tail);

        self.appended.notify_waiters();
        Ok(seq)
    }

    /// Append a record stamped with the next clock timestamp.
    pub fn append_now(
        &self,
        op: OpKind,
        namespace: impl Into<String>,
        document_id: impl Into<String>,
        body: Option<Vec<u8>>,
    ) -> Result<LogRecord, Error> {
        let mut tail = self.tail.lock();
        let timestamp = clock::next_timestamp(tail.timestamp, clock::unix_seconds());
        let record = LogRecord::new(timestamp, op, namespace, document_id, body);
        self.append_locked(&mut tail, &record)?;
        drop(tail);

        self.appended.notify_waiters();
        Ok(record)
    }

    fn append_locked(&self, tail: &mut Tail, record: &LogRecord) -> Result<u64, Error> {
        if let Some(last) = tail.timestamp {
            if record.timestamp < last {
                return Err(Error::OutOfOrder {
                    last,
                    attempted: record.timestamp,
                });
            }
        }

        let seq = tail.seq + 1;
        let value = record.to_bytes()?;
        self.tree.insert(seq.to_be_bytes(), value)?;

        tail.seq = seq;
        tail.timestamp = Some(record.timestamp);
        trace!(seq, timestamp = %record.timestamp, "appended oplog record");
        Ok(seq)
    }

    /// Timestamp of the last appended record.
    pub fn latest_timestamp(&self) -> Option<LogicalTimestamp> {
        self.tail.lock().timestamp
    }

    /// Number of records in the log.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Number of tailable cursors opened and not yet closed.
    pub fn open_cursor_count(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Flush the log to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.tree.flush()?;
        self.meta.flush()?;
        Ok(())
    }

    /// Timestamp of the record stored at `seq`.
    fn timestamp_at(&self, seq: u64) -> Result<LogicalTimestamp, Error> {
        let value = self.tree.get(seq.to_be_bytes())?.ok_or(Error::InvalidKey)?;
        Ok(LogRecord::from_bytes(&value)?.timestamp)
    }

    /// First sequence in `1..=tail + 1` whose timestamp is greater than `bound`.
    fn first_seq_after(&self, bound: LogicalTimestamp, tail: u64) -> Result<u64, Error> {
        let (mut lo, mut hi) = (1u64, tail + 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.timestamp_at(mid)? > bound {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(lo)
    }

    /// Inclusive sequence range of the records matching `filter`.
    fn matching_range(&self, filter: TimestampFilter) -> Result<Option<(u64, u64)>, Error> {
        let tail = self.tail.lock().seq;
        let (first, last) = match filter {
            TimestampFilter::Unbounded => (1, tail),
            TimestampFilter::AtOrBefore(bound) => (1, self.first_seq_after(bound, tail)? - 1),
            TimestampFilter::After(bound) => (self.first_seq_after(bound, tail)?, tail),
        };
        Ok((first <= last).then_some((first, last)))
    }

    /// Scan forward from the cursor position for up to one batch.
    fn scan(&self, cursor: &mut OpLogCursor) -> Result<Vec<LogRecord>, Error> {
        let mut batch = Vec::with_capacity(cursor.options.batch_size.min(1000));
        let start = cursor.position.saturating_add(1).to_be_bytes();

        for result in self.tree.range(start..) {
            let (key, value) = result?;
            let seq = decode_seq(&key)?;
            let record = LogRecord::from_bytes(&value)?;
            cursor.position = seq;

            if cursor.filter.matches(record.timestamp) {
                batch.push(record);
                if batch.len() >= cursor.options.batch_size {
                    break;
                }
            }
        }

        Ok(batch)
    }
}

#[async_trait]
impl LogStore for OpLog {
    type Cursor = OpLogCursor;

    fn check_tailable(&self) -> Result<(), Error> {
        let marker = self.meta.get(FORMAT_KEY)?.ok_or_else(|| {
            Error::Configuration("database is not an oplog: format marker is missing".to_string())
        })?;

        let version = <[u8; 4]>::try_from(marker.as_ref())
            .map(u32::from_be_bytes)
            .map_err(|_| Error::Configuration("unreadable oplog format marker".to_string()))?;

        if version != FORMAT_VERSION {
            return Err(Error::Configuration(format!(
                "oplog format version {version} is not supported (expected {FORMAT_VERSION})"
            )));
        }
        Ok(())
    }

    async fn find_one(
        &self,
        filter: TimestampFilter,
        order: SortOrder,
    ) -> Result<Option<LogRecord>, Error> {
        let Some((first, last)) = self.matching_range(filter)? else {
            return Ok(None);
        };
        let seq = match order {
            SortOrder::Natural => first,
            SortOrder::ReverseNatural => last,
        };

        let value = self.tree.get(seq.to_be_bytes())?.ok_or(Error::InvalidKey)?;
        Ok(Some(LogRecord::from_bytes(&value)?))
    }

    async fn open_tailable_cursor(
        &self,
        filter: TimestampFilter,
        options: CursorOptions,
    ) -> Result<OpLogCursor, Error> {
        // Earlier records can never match, so start just before the first match.
        let position = match filter {
            TimestampFilter::After(bound) => {
                let tail = self.tail.lock().seq;
                self.first_seq_after(bound, tail)? - 1
            }
            TimestampFilter::Unbounded | TimestampFilter::AtOrBefore(_) => 0,
        };

        let id = self.next_cursor_id.fetch_add(1, Ordering::SeqCst);
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        debug!(
            cursor = id,
            ?filter,
            position,
            batch_size = options.batch_size,
            "opened tailable cursor"
        );

        Ok(OpLogCursor {
            id,
            filter,
            position,
            options,
        })
    }

    async fn pull(&self, cursor: &mut OpLogCursor) -> Result<Vec<LogRecord>, Error> {
        // Register for wakeups before scanning so an append racing the scan is not missed.
        let notified = self.appended.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = self.scan(cursor)?;
        if !batch.is_empty() {
            return Ok(batch);
        }

        if tokio::time::timeout(cursor.options.await_interval, notified)
            .await
            .is_err()
        {
            trace!(cursor = cursor.id, "await interval elapsed without new records");
            return Ok(batch);
        }

        self.scan(cursor)
    }

    fn close(&self, cursor: OpLogCursor) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        debug!(cursor = cursor.id, position = cursor.position, "closed tailable cursor");
    }
}

fn decode_seq(key: &[u8]) -> Result<u64, Error> {
    <[u8; 8]>::try_from(key)
        .map(u64::from_be_bytes)
        .map_err(|_| Error::InvalidKey)
}
