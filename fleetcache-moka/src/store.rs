//! Moka shared store implementation.

use std::future::ready;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetcache_backend::{BackendResult, DeleteStatus, LockStatus, SharedStore};
use fleetcache_core::Raw;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use smol_str::SmolStr;
use tracing::trace;

/// A stored value with its absolute expiration time.
#[derive(Debug, Clone)]
pub(crate) struct StoredValue {
    pub(crate) data: Raw,
    pub(crate) expire: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn new(data: Raw, ttl: Option<Duration>) -> Self {
        let expire = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self { data, expire }
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.expire.is_some_and(|expire| expire <= Utc::now())
    }
}

/// In-memory shared store powered by Moka.
///
/// `MokaStore` keeps every key in a concurrent Moka cache and expires
/// entries according to the TTL given on write. The atomic operations
/// ([`set_if_absent`](SharedStore::set_if_absent) and
/// [`delete_if_equals`](SharedStore::delete_if_equals)) use Moka's
/// per-key compute API, so they are atomic with respect to every other
/// operation on the same key.
///
/// # Examples
///
/// ```
/// use fleetcache_moka::MokaStore;
///
/// // Unbounded store
/// let store = MokaStore::new();
///
/// // Bounded store
/// let store = MokaStore::builder().max_entries(10_000).build();
/// ```
///
/// # Caveats
///
/// - Data is **not persisted** and **not shared** across OS processes;
///   clones of one store share data, nothing else does
/// - A bounded store may evict locks and memoization records under
///   capacity pressure; size it above the working set or leave it unbounded
#[derive(Clone)]
pub struct MokaStore {
    pub(crate) cache: Cache<SmolStr, StoredValue>,
    pub(crate) label: SmolStr,
}

impl std::fmt::Debug for MokaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStore")
            .field("label", &self.label)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl Default for MokaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MokaStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a new builder for `MokaStore`.
    pub fn builder() -> crate::builder::MokaStoreBuilder {
        crate::builder::MokaStoreBuilder::new()
    }

    /// Approximate number of live entries.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    /// Current raw value of `key`, for assertions in tests.
    pub async fn peek(&self, key: &str) -> Option<Raw> {
        self.cache
            .get(key)
            .await
            .filter(|value| !value.is_expired())
            .map(|value| value.data)
    }
}

#[async_trait]
impl SharedStore for MokaStore {
    async fn get(&self, key: &str) -> BackendResult<Option<Raw>> {
        Ok(self.peek(key).await)
    }

    async fn set(&self, key: &str, value: Raw, ttl: Option<Duration>) -> BackendResult<()> {
        trace!(key, ?ttl, "moka set");
        self.cache
            .insert(SmolStr::new(key), StoredValue::new(value, ttl))
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<DeleteStatus> {
        match self.cache.remove(key).await {
            Some(value) if !value.is_expired() => Ok(DeleteStatus::Deleted(1)),
            _ => Ok(DeleteStatus::Missing),
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Raw,
        ttl: Duration,
    ) -> BackendResult<LockStatus> {
        let stored = StoredValue::new(value, Some(ttl));
        let result = self
            .cache
            .entry(SmolStr::new(key))
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if !entry.value().is_expired() => Op::Nop,
                    _ => Op::Put(stored),
                };
                ready(op)
            })
            .await;

        let status = match result {
            CompResult::Inserted(_) | CompResult::ReplacedWith(_) => LockStatus::Acquired,
            _ => LockStatus::Locked,
        };
        trace!(key, ?status, "moka set_if_absent");
        Ok(status)
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> BackendResult<DeleteStatus> {
        let result = self
            .cache
            .entry(SmolStr::new(key))
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry)
                        if !entry.value().is_expired()
                            && entry.value().data.as_ref() == expected =>
                    {
                        Op::Remove
                    }
                    _ => Op::Nop,
                };
                ready(op)
            })
            .await;

        Ok(match result {
            CompResult::Removed(_) => DeleteStatus::Deleted(1),
            _ => DeleteStatus::Missing,
        })
    }

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<DeleteStatus> {
        let keys: Vec<_> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();

        let mut deleted = 0u32;
        for key in keys {
            if self.cache.remove(key.as_str()).await.is_some() {
                deleted += 1;
            }
        }
        trace!(prefix, deleted, "moka delete_prefix");

        Ok(if deleted > 0 {
            DeleteStatus::Deleted(deleted)
        } else {
            DeleteStatus::Missing
        })
    }

    fn name(&self) -> &str {
        &self.label
    }
}
