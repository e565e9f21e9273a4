//! Values as they are stored in the shared store.
//!
//! - [`Envelope`] - a distributed cache entry: the value plus the version of
//!   the write that produced it
//! - [`MemoRecord`] - a memoization result with its computation time and TTL
//!
//! ## The "no value" sentinel
//!
//! Envelopes wrap the user value as-is. Caching an `Option<T>` therefore
//! stores `None` as a present entry: reading it back yields `Some(None)`,
//! which is distinct from a key that was never written (`None`).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// A distributed cache entry as stored in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<V> {
    #[serde(rename = "v")]
    version: Version,
    #[serde(rename = "d")]
    value: V,
}

impl<V> Envelope<V> {
    /// Wraps `value` written at `version`.
    pub fn new(version: Version, value: V) -> Self {
        Self { version, value }
    }

    /// Version of the write that produced this entry.
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns a reference to the value.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the envelope and returns version and value.
    pub fn into_parts(self) -> (Version, V) {
        (self.version, self.value)
    }
}

/// A memoization result.
///
/// The store expires the record after `ttl`; [`MemoRecord::is_expired`]
/// guards against stores with coarse expiry.
///
/// ```
/// use fleetcache_core::MemoRecord;
/// use std::time::Duration;
///
/// let record = MemoRecord::new(42, Duration::from_secs(120));
/// assert!(!record.is_expired());
/// assert_eq!(record.ttl(), Duration::from_secs(120));
/// assert_eq!(record.into_value(), 42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoRecord<V> {
    value: V,
    computed_at: DateTime<Utc>,
    ttl_ms: u64,
}

impl<V> MemoRecord<V> {
    /// Creates a record computed now.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self::computed_at(value, Utc::now(), ttl)
    }

    /// Creates a record with an explicit computation time.
    pub fn computed_at(value: V, computed_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            computed_at,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns a reference to the value.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the record and returns the value.
    pub fn into_value(self) -> V {
        self.value
    }

    /// When the computation finished.
    #[inline]
    pub fn computed(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Lifetime of the record.
    #[inline]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// When the record stops being valid.
    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::try_milliseconds(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX))
            .and_then(|ttl| self.computed_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the record is past its TTL.
    pub fn is_expired(&self) -> bool {
        self.expires_at() <= Utc::now()
    }

    /// Remaining lifetime, `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        (self.expires_at() - Utc::now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }
}
