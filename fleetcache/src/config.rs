//! Distributed cache configuration.
//!
//! All types deserialize from human-friendly documents, durations included:
//!
//! ```
//! use fleetcache::config::CacheConfig;
//! use std::time::Duration;
//!
//! let config: CacheConfig = serde_json::from_str(
//!     r#"{"ttl": "10m", "format": "bincode", "listener": {"reconnect_max": "5s"}}"#,
//! ).unwrap();
//! assert_eq!(config.ttl, Some(Duration::from_secs(600)));
//! assert_eq!(config.listener.reconnect_max, Duration::from_secs(5));
//! ```

use std::time::Duration;

use fleetcache_backend::ValueFormat;
use serde::{Deserialize, Serialize};

/// Settings of one [`DistributedCache`](crate::DistributedCache) instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Expiry of entries in the shared store and the local mirror
    /// (e.g., "30s", "10m"). `None` keeps entries until cleared.
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// Encoding of values in the shared store.
    pub format: ValueFormat,
    /// Invalidation listener settings.
    pub listener: ListenerConfig,
}

impl CacheConfig {
    /// Sets the entry TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the value encoding.
    pub fn format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the listener settings.
    pub fn listener(mut self, listener: ListenerConfig) -> Self {
        self.listener = listener;
        self
    }
}

/// Resubscription policy of the invalidation listener.
///
/// After the subscription stream ends the listener waits `reconnect_initial`,
/// then doubles the delay after every failed attempt up to `reconnect_max`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// First resubscription delay.
    #[serde(with = "humantime_serde")]
    pub reconnect_initial: Duration,
    /// Upper bound of the resubscription delay.
    #[serde(with = "humantime_serde")]
    pub reconnect_max: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(100),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

impl ListenerConfig {
    /// Delay following `current` after another failed attempt.
    pub(crate) fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.reconnect_max)
    }
}
