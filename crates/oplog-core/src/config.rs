//! Tailing configuration.

use std::time::Duration;

use crate::error::Error;

/// Default number of records returned by a single pull.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default time a pull waits for new records before returning empty, in milliseconds.
pub const DEFAULT_AWAIT_INTERVAL_MS: u64 = 1000;

/// Settings for a [`TailingStream`](crate::TailingStream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    /// Maximum records returned by one pull.
    pub batch_size: usize,

    /// How long a pull waits for new records when the cursor is at the tail.
    pub await_interval: Duration,
}

impl TailConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            await_interval: Duration::from_millis(DEFAULT_AWAIT_INTERVAL_MS),
        }
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the await interval.
    pub fn with_await_interval(mut self, interval: Duration) -> Self {
        self.await_interval = interval;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.await_interval.is_zero() {
            return Err(Error::Configuration(
                "await interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TailConfig {
    fn default() -> Self {
        Self::new()
    }
}
