//! Session configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default interval between keepalive transmissions.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(200);

/// Default time after which the SBrick drops a silent connection.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of frames that may wait for transmission.
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Default buffer size of the state change broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Settings shared by every session created from them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionConfig {
    /// Interval between keepalive transmissions while ready.
    pub keepalive_interval: Duration,
    /// Device watchdog timeout. The keepalive interval must stay below it.
    pub watchdog_timeout: Duration,
    /// Maximum number of pending frames per session.
    pub queue_capacity: usize,
    /// Buffer size of the state change broadcast channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Set the keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the device watchdog timeout.
    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the state change channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check that the settings can keep a device alive.
    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval.is_zero() || self.keepalive_interval >= self.watchdog_timeout {
            return Err(Error::InvalidParameter {
                name: "keepalive_interval".to_string(),
                value: format!(
                    "{:?} (must be non-zero and below watchdog timeout {:?})",
                    self.keepalive_interval, self.watchdog_timeout
                ),
            });
        }

        if self.queue_capacity == 0 {
            return Err(Error::InvalidParameter {
                name: "queue_capacity".to_string(),
                value: self.queue_capacity.to_string(),
            });
        }

        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter {
                name: "event_capacity".to_string(),
                value: self.event_capacity.to_string(),
            });
        }

        Ok(())
    }
}
