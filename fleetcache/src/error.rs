use std::time::Duration;

use fleetcache_backend::{BackendError, BoxError, FormatError};
use fleetcache_core::KeyError;
use thiserror::Error;

/// Errors returned by [`DistributedCache`](crate::DistributedCache).
///
/// Reads never produce one: a store failure on the read path is logged and
/// treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The shared store or the bus rejected a write, delete or publish.
    #[error("shared store unavailable: {0}")]
    Backend(#[from] BackendError),
    /// The value could not be encoded.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// The computation passed to `defer_get_set` failed.
    #[error("computation failed: {0}")]
    Compute(#[source] BoxError),
    /// The namespace given to the builder is blank.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(#[from] KeyError),
}

/// Errors returned by [`LockManager`](crate::lock::LockManager).
#[derive(Debug, Error)]
pub enum LockError {
    /// Another owner still holds the lock after the allowed wait.
    #[error("lock {key} is busy")]
    Busy {
        /// Store key of the lock.
        key: String,
    },
    /// The store failed while acquiring.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors returned by [`Memoizer::memoize`](crate::Memoizer::memoize).
#[derive(Debug, Error)]
pub enum MemoizeError {
    /// The shared store failed outside of the waiting loop.
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(#[from] BackendError),
    /// Another process holds the lock and no record appeared in time.
    #[error("no value for {name} after waiting {waited:?}")]
    LockTimeout {
        /// Logical name passed to `memoize`.
        name: String,
        /// How long this caller waited.
        waited: Duration,
    },
    /// The computation failed. Nothing was stored and the lock was released.
    #[error("computation failed: {0}")]
    Compute(#[source] BoxError),
    /// The record could not be encoded or decoded.
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl MemoizeError {
    /// Whether retrying later may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MemoizeError::StoreUnavailable(_) | MemoizeError::LockTimeout { .. }
        )
    }
}
