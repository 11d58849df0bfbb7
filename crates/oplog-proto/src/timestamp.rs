//! Logical timestamps for operation log records.

use std::fmt;
use std::str::FromStr;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;

/// Position of a record in logical time.
///
/// Ordered by `epoch` first, then `ordinal`. The log guarantees timestamps are
/// non-decreasing in append order, but several records may carry the same
/// timestamp, so a timestamp alone does not identify a record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct LogicalTimestamp {
    /// Coarse component, seconds since the unix epoch for clock-stamped records.
    pub epoch: u32,
    /// Fine component, increments for records within the same epoch.
    pub ordinal: u32,
}

impl LogicalTimestamp {
    /// The smallest possible timestamp.
    pub const MIN: Self = Self::new(0, 0);

    /// Create a timestamp from its components.
    pub const fn new(epoch: u32, ordinal: u32) -> Self {
        Self { epoch, ordinal }
    }

    /// The largest possible timestamp.
    pub const MAX: Self = Self::new(u32::MAX, u32::MAX);

    /// The immediate successor of this timestamp in logical time.
    ///
    /// [`MAX`](Self::MAX) is its own successor.
    pub fn successor(self) -> Self {
        match (self.ordinal.checked_add(1), self.epoch.checked_add(1)) {
            (Some(ordinal), _) => Self::new(self.epoch, ordinal),
            (None, Some(epoch)) => Self::new(epoch, 0),
            (None, None) => Self::MAX,
        }
    }
}

impl fmt::Display for LogicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.epoch, self.ordinal)
    }
}

impl FromStr for LogicalTimestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidTimestamp(s.to_string());
        let (epoch, ordinal) = s.trim().split_once(':').ok_or_else(invalid)?;
        let epoch = epoch.parse().map_err(|_| invalid())?;
        let ordinal = ordinal.parse().map_err(|_| invalid())?;
        Ok(Self::new(epoch, ordinal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_epoch_first() {
        assert!(LogicalTimestamp::new(1, 9) < LogicalTimestamp::new(2, 0));
        assert!(LogicalTimestamp::new(2, 0) < LogicalTimestamp::new(2, 1));
        assert_eq!(LogicalTimestamp::new(3, 3), LogicalTimestamp::new(3, 3));
    }

    #[test]
    fn test_parse_and_display() {
        let ts: LogicalTimestamp = "1700000000:7".parse().unwrap();
        assert_eq!(ts, LogicalTimestamp::new(1_700_000_000, 7));
        assert_eq!(ts.to_string(), "1700000000:7");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("12".parse::<LogicalTimestamp>().is_err());
        assert!("a:1".parse::<LogicalTimestamp>().is_err());
        assert!("1:-1".parse::<LogicalTimestamp>().is_err());
    }

    #[test]
    fn test_successor_rolls_over() {
        assert_eq!(
            LogicalTimestamp::new(1, 1).successor(),
            LogicalTimestamp::new(1, 2)
        );
        assert_eq!(
            LogicalTimestamp::new(1, u32::MAX).successor(),
            LogicalTimestamp::new(2, 0)
        );
    }

    #[test]
    fn test_successor_never_goes_backwards() {
        assert_eq!(LogicalTimestamp::MAX.successor(), LogicalTimestamp::MAX);
        let below = LogicalTimestamp::new(u32::MAX - 1, u32::MAX);
        assert_eq!(below.successor(), LogicalTimestamp::new(u32::MAX, 0));
        assert!(below.successor() > below);
    }
}
