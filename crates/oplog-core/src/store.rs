//! The log store seam consumed by the tailing machinery.

use std::time::Duration;

use async_trait::async_trait;
use oplog_proto::{LogRecord, LogicalTimestamp};

use crate::config::TailConfig;
use crate::error::Error;

/// Timestamp predicate applied by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFilter {
    /// Every record matches.
    Unbounded,
    /// Records with `timestamp <= bound`.
    AtOrBefore(LogicalTimestamp),
    /// Records with `timestamp > bound`.
    After(LogicalTimestamp),
}

impl TimestampFilter {
    /// Check whether a timestamp satisfies this filter.
    pub fn matches(&self, timestamp: LogicalTimestamp) -> bool {
        match self {
            TimestampFilter::Unbounded => true,
            TimestampFilter::AtOrBefore(bound) => timestamp <= *bound,
            TimestampFilter::After(bound) => timestamp > *bound,
        }
    }
}

/// Direction over the store's append order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest appended first.
    Natural,
    /// Newest appended first.
    ReverseNatural,
}

/// Options for a tailable cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorOptions {
    /// Upper bound on records returned per pull.
    pub batch_size: usize,
    /// How long a pull at the tail waits for new records before returning empty.
    pub await_interval: Duration,
}

impl From<&TailConfig> for CursorOptions {
    fn from(config: &TailConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            await_interval: config.await_interval,
        }
    }
}

/// An append-ordered log that supports point queries and live tailing.
///
/// Tailable cursors never expire from inactivity. A pull waits for new data
/// rather than returning empty immediately, for at most the cursor's await
/// interval, and is the only operation expected to suspend for long.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Exclusively owned read position into the log.
    type Cursor: Send;

    /// Verify the store is set up for tailing.
    fn check_tailable(&self) -> Result<(), Error>;

    /// Return the first record matching `filter` in the given order.
    async fn find_one(
        &self,
        filter: TimestampFilter,
        order: SortOrder,
    ) -> Result<Option<LogRecord>, Error>;

    /// Open a live, blocking-wait cursor over records matching `filter`.
    async fn open_tailable_cursor(
        &self,
        filter: TimestampFilter,
        options: CursorOptions,
    ) -> Result<Self::Cursor, Error>;

    /// Advance the cursor and return the next batch, possibly empty.
    async fn pull(&self, cursor: &mut Self::Cursor) -> Result<Vec<LogRecord>, Error>;

    /// Release the cursor's resources.
    fn close(&self, cursor: Self::Cursor);
}
