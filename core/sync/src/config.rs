//! Sync engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use tasksync_common::{Error, Result};

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of the drain timer, serialized as whole seconds.
    #[serde(with = "duration_secs", rename = "sync_interval_secs")]
    pub sync_interval: Duration,
    /// Maximum number of queued operations submitted at once during a drain.
    pub max_in_flight: usize,
    /// Drain the queue right after a successful fetch when it is not empty.
    pub drain_after_fetch: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            max_in_flight: 4,
            drain_after_fetch: true,
        }
    }
}

impl SyncConfig {
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_drain_after_fetch(mut self, enabled: bool) -> Self {
        self.drain_after_fetch = enabled;
        self
    }

    /// Check that the configuration can drive an engine.
    ///
    /// # Errors
    /// - `InvalidInput` if the interval is zero or `max_in_flight` is zero
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval.is_zero() {
            return Err(Error::InvalidInput(
                "sync_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(Error::InvalidInput(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
