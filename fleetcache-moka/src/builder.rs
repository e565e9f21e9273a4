//! Builder for configuring [`MokaStore`].

use std::time::{Duration, Instant};

use chrono::Utc;
use moka::Expiry;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use smol_str::SmolStr;

use crate::store::{MokaStore, StoredValue};

/// Custom expiration policy that calculates TTL from [`StoredValue::expire`] timestamps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Expiration;

impl Expiry<SmolStr, StoredValue> for Expiration {
    fn expire_after_create(
        &self,
        _key: &SmolStr,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::calculate_ttl(value)
    }

    fn expire_after_update(
        &self,
        _key: &SmolStr,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Always use the NEW value's expiration time. Moka's default keeps the
        // old one, which would let a re-acquired lock inherit a stale deadline.
        Self::calculate_ttl(value)
    }
}

impl Expiration {
    fn calculate_ttl(value: &StoredValue) -> Option<Duration> {
        value.expire.map(|expiration| {
            let millis = (expiration - Utc::now()).num_milliseconds();
            if millis <= 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(millis as u64)
            }
        })
    }
}

/// Builder for creating and configuring a [`MokaStore`].
///
/// Use [`MokaStore::builder`] to create a new builder instance.
///
/// # Examples
///
/// ```
/// use fleetcache_moka::{EvictionPolicy, MokaStore};
///
/// let store = MokaStore::builder()
///     .label("sessions")
///     .max_entries(100_000)
///     .eviction_policy(EvictionPolicy::lru())
///     .build();
/// ```
pub struct MokaStoreBuilder {
    max_entries: Option<u64>,
    label: SmolStr,
    eviction_policy: Option<EvictionPolicy>,
}

impl Default for MokaStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MokaStoreBuilder {
    /// Creates a new builder for an unbounded store.
    pub fn new() -> Self {
        Self {
            max_entries: None,
            label: SmolStr::new_static("moka"),
            eviction_policy: None,
        }
    }

    /// Sets the maximum number of entries the store can hold.
    ///
    /// When the store exceeds this capacity, entries are evicted according to
    /// the eviction policy.
    pub fn max_entries(mut self, capacity: u64) -> Self {
        self.max_entries = Some(capacity);
        self
    }

    /// Sets a custom label for this store.
    ///
    /// # Default
    ///
    /// `"moka"`
    pub fn label(mut self, label: impl Into<SmolStr>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the eviction policy used once `max_entries` is reached.
    ///
    /// # Default
    ///
    /// [`EvictionPolicy::tiny_lfu()`]
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Builds the [`MokaStore`].
    pub fn build(self) -> MokaStore {
        let policy = self.eviction_policy.unwrap_or_else(EvictionPolicy::tiny_lfu);
        let mut builder = Cache::<SmolStr, StoredValue>::builder()
            .eviction_policy(policy)
            .expire_after(Expiration);
        if let Some(capacity) = self.max_entries {
            builder = builder.max_capacity(capacity);
        }

        MokaStore {
            cache: builder.build(),
            label: self.label,
        }
    }
}
