use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use fleetcache_core::Raw;

use crate::{BackendError, DeleteStatus, LockStatus};

/// Result alias for store and bus operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Key/value store shared by every process of the fleet.
///
/// Keys are produced by [`KeyCodec`](fleetcache_core::KeyCodec); values are
/// opaque bytes. Implementations must make [`set_if_absent`] and
/// [`delete_if_equals`] atomic with respect to every other operation on the
/// same key, since they are the only synchronization primitives locks are
/// built on.
///
/// [`set_if_absent`]: SharedStore::set_if_absent
/// [`delete_if_equals`]: SharedStore::delete_if_equals
#[async_trait]
pub trait SharedStore: Sync + Send {
    /// Reads `key`; `None` when absent or expired.
    async fn get(&self, key: &str) -> BackendResult<Option<Raw>>;

    /// Writes `key`, replacing any previous value. `None` means no expiry.
    async fn set(&self, key: &str, value: Raw, ttl: Option<Duration>) -> BackendResult<()>;

    /// Removes `key`.
    async fn delete(&self, key: &str) -> BackendResult<DeleteStatus>;

    /// Writes `key` only when it does not exist, atomically.
    async fn set_if_absent(&self, key: &str, value: Raw, ttl: Duration)
    -> BackendResult<LockStatus>;

    /// Removes `key` only when its current value equals `expected`, atomically.
    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> BackendResult<DeleteStatus>;

    /// Removes every key starting with `prefix`.
    ///
    /// Not required to be atomic: keys written concurrently may survive.
    async fn delete_prefix(&self, prefix: &str) -> BackendResult<DeleteStatus>;

    /// Returns the name of this store for logs and metrics labels.
    fn name(&self) -> &str {
        "store"
    }
}

#[async_trait]
impl<T> SharedStore for Box<T>
where
    T: SharedStore + ?Sized,
{
    async fn get(&self, key: &str) -> BackendResult<Option<Raw>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Raw, ttl: Option<Duration>) -> BackendResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> BackendResult<DeleteStatus> {
        (**self).delete(key).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Raw,
        ttl: Duration,
    ) -> BackendResult<LockStatus> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> BackendResult<DeleteStatus> {
        (**self).delete_if_equals(key, expected).await
    }

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<DeleteStatus> {
        (**self).delete_prefix(prefix).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T> SharedStore for Arc<T>
where
    T: SharedStore + ?Sized,
{
    async fn get(&self, key: &str) -> BackendResult<Option<Raw>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Raw, ttl: Option<Duration>) -> BackendResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> BackendResult<DeleteStatus> {
        (**self).delete(key).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Raw,
        ttl: Duration,
    ) -> BackendResult<LockStatus> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> BackendResult<DeleteStatus> {
        (**self).delete_if_equals(key, expected).await
    }

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<DeleteStatus> {
        (**self).delete_prefix(prefix).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
