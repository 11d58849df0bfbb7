//! Timestamp assignment for clock-stamped appends.

use std::time::{SystemTime, UNIX_EPOCH};

use oplog_proto::LogicalTimestamp;

/// Current wall-clock time in whole seconds, clamped to the `u32` range.
pub fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

/// Pick the timestamp for a record appended at `now` after `last`.
///
/// A new second starts at ordinal 1. Within the same second, or if the wall
/// clock is behind the log tail, the ordinal advances past `last` so the log
/// never goes backwards.
pub fn next_timestamp(last: Option<LogicalTimestamp>, now: u32) -> LogicalTimestamp {
    match last {
        Some(last) if last.epoch >= now => last.successor(),
        _ => LogicalTimestamp::new(now, 1),
    }
}
