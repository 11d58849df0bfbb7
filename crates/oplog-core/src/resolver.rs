//! Resume point resolution.

use std::sync::Arc;

use oplog_proto::{LogRecord, LogicalTimestamp};
use tracing::debug;

use crate::error::Error;
use crate::store::{LogStore, SortOrder, TimestampFilter};

/// Finds the record a tail should resume after.
pub struct ResumePointResolver<S> {
    store: Arc<S>,
}

impl<S: LogStore> ResumePointResolver<S> {
    /// Create a resolver over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Find the most recently appended record with a timestamp at or before
    /// `boundary`, or the most recent record overall when no boundary is given.
    ///
    /// Returns `None` when the log is empty or every record is later than the
    /// boundary. Read-only.
    pub async fn find_most_recent_at_or_before(
        &self,
        boundary: Option<LogicalTimestamp>,
    ) -> Result<Option<LogRecord>, Error> {
        let filter = match boundary {
            Some(bound) => TimestampFilter::AtOrBefore(bound),
            None => TimestampFilter::Unbounded,
        };

        let found = self.store.find_one(filter, SortOrder::ReverseNatural).await?;
        debug!(
            boundary = ?boundary,
            resolved = ?found.as_ref().map(|r| r.timestamp),
            "resolved resume point"
        );
        Ok(found)
    }
}

impl<S> Clone for ResumePointResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use oplog_proto::OpKind;

    use super::*;
    use crate::oplog::OpLog;

    fn ts(epoch: u32, ordinal: u32) -> LogicalTimestamp {
        LogicalTimestamp::new(epoch, ordinal)
    }

    fn create_log(timestamps: &[(u32, u32)]) -> Arc<OpLog> {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let log = OpLog::open(&db).unwrap();
        for (i, (epoch, ordinal)) in timestamps.iter().enumerate() {
            log.append(LogRecord::new(
                ts(*epoch, *ordinal),
                OpKind::Insert,
                "test.items",
                format!("doc{i}"),
                None,
            ))
            .unwrap();
        }
        Arc::new(log)
    }

    #[tokio::test]
    async fn test_unbounded_returns_newest() {
        let resolver = ResumePointResolver::new(create_log(&[(1, 0), (1, 1), (2, 0)]));
        let found = resolver.find_most_recent_at_or_before(None).await.unwrap().unwrap();
        assert_eq!(found.timestamp, ts(2, 0));
        assert_eq!(found.document_id, "doc2");
    }

    #[tokio::test]
    async fn test_bounded_returns_latest_not_after_boundary() {
        let resolver = ResumePointResolver::new(create_log(&[(1, 0), (1, 1), (2, 0)]));

        let found = resolver
            .find_most_recent_at_or_before(Some(ts(1, 1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.timestamp, ts(1, 1));

        // A boundary between records resolves to the earlier one.
        let found = resolver
            .find_most_recent_at_or_before(Some(ts(1, 9)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.timestamp, ts(1, 1));
    }

    #[tokio::test]
    async fn test_tied_timestamps_resolve_to_last_appended() {
        let resolver = ResumePointResolver::new(create_log(&[(1, 0), (1, 1), (1, 1), (2, 0)]));
        let found = resolver
            .find_most_recent_at_or_before(Some(ts(1, 1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.document_id, "doc2");
    }

    #[tokio::test]
    async fn test_none_when_nothing_qualifies() {
        let resolver = ResumePointResolver::new(create_log(&[(5, 0), (6, 0)]));
        let found = resolver
            .find_most_recent_at_or_before(Some(ts(4, 9)))
            .await
            .unwrap();
        assert!(found.is_none());

        let empty = ResumePointResolver::new(create_log(&[]));
        assert!(empty.find_most_recent_at_or_before(None).await.unwrap().is_none());
    }
}
