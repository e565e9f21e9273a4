#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Distributed cache with a local mirror and pub/sub invalidation.
///
/// [`DistributedCache`](cache::DistributedCache) is the entry point; the
/// [`mirror`](cache::mirror) module exposes the version-gated local map it
/// is built on.
pub mod cache;

/// In-process "compute once, let others wait" handoff.
///
/// Used by `defer_get_set` and `memoize` so that concurrent callers in one
/// process share a single pending result instead of racing.
pub mod concurrency;

/// Distributed cache configuration types.
pub mod config;

/// Error types for cache, lock and memoize operations.
///
/// - [`CacheError`]: write-path failures of the distributed cache
/// - [`LockError`]: busy locks and store failures
/// - [`MemoizeError`]: store unavailability, lock timeouts, computation failures
pub mod error;

/// Cluster-wide locks in the shared store.
pub mod lock;

/// At-most-once distributed memoization.
pub mod memoize;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, this module registers counters
/// and histograms for:
/// - Local mirror hits and misses
/// - Invalidations published, applied and ignored
/// - Memoize computations, hits, waits and timeouts
/// - Lock acquisitions and contention
pub mod metrics;

/// Memoizer and backoff policy.
///
/// Defines [`MemoizeConfig`](policy::MemoizeConfig) with:
/// - **Lock TTL**: how long a computation lock survives a crashed holder
/// - **Lock wait**: how long to retry the lock before switching to waiting
/// - **Wait timeout**: how long a waiter polls for the record
/// - **Backoff**: the bounded exponential poll schedule
pub mod policy;

pub use cache::DistributedCache;
pub use config::{CacheConfig, ListenerConfig};
pub use error::{CacheError, LockError, MemoizeError};
pub use lock::{LockGuard, LockManager, ReleaseStatus};
pub use memoize::{MemoizeState, Memoizer};
pub use policy::{BackoffConfig, MemoizeConfig};

pub use fleetcache_backend::{PubSub, SharedStore, ValueFormat};
pub use fleetcache_core::{KeyCodec, Namespace, ProcessId, Version};

/// The `fleetcache` prelude.
///
/// ```rust
/// use fleetcache::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CacheConfig, CacheError, DistributedCache, MemoizeConfig, MemoizeError, Memoizer,
        PubSub, SharedStore,
    };
}
