//! Distributed memoization: a named computation runs at most once across
//! the fleet per time window.
//!
//! Every call is a shared store round trip; there is no local copy of a
//! record. Per call, the memoizer moves through [`MemoizeState`]:
//!
//! ```text
//! Idle -> AcquiringLock -> Computing -> Done
//!                       \-> Waiting --> Done | Failed
//! ```
//!
//! The winner of the lock re-checks the record, computes, stores the record
//! with the requested TTL and releases the lock. Losers poll for the record
//! with bounded backoff and fail with [`MemoizeError::LockTimeout`] rather
//! than compute without the lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fleetcache_backend::{BoxError, DeleteStatus, Format, SharedStore};
use fleetcache_core::{KeyCodec, MemoRecord, Raw};
use serde::{Serialize, de::DeserializeOwned};
use smol_str::SmolStr;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

#[cfg(feature = "metrics")]
use crate::metrics::{
    MEMOIZE_COMPUTED, MEMOIZE_DURATION, MEMOIZE_HIT, MEMOIZE_TIMEOUT, MEMOIZE_WAITED,
};

use crate::concurrency::{ConcurrencyDecision, InFlight};
use crate::error::{LockError, MemoizeError};
use crate::lock::{LockGuard, LockManager, ReleaseStatus};
use crate::policy::{MemoizeConfig, deadline};

/// Per-call state of [`Memoizer::memoize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoizeState {
    /// Call started.
    Idle,
    /// Trying to become the computer.
    AcquiringLock,
    /// Holding the lock.
    Computing,
    /// Another process holds the lock; polling for its record.
    Waiting,
    /// A value was returned.
    Done,
    /// An error was returned.
    Failed,
}

/// What an in-process leader hands to the callers waiting on it.
#[derive(Debug, Clone)]
enum Shared {
    /// Encoded record.
    Record(Raw),
    /// The leader gave up waiting for another process.
    TimedOut(Duration),
}

struct MemoizerInner {
    store: Arc<dyn SharedStore>,
    locks: LockManager,
    codec: KeyCodec,
    config: MemoizeConfig,
    in_flight: InFlight<SmolStr, Shared>,
}

/// Runs named computations at most once per window across every process
/// sharing a store.
///
/// Clones share the in-process deduplication, so concurrent calls for one
/// name within a process make a single store round trip.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use fleetcache::Memoizer;
/// use fleetcache_moka::MokaStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), fleetcache::MemoizeError> {
/// let memoizer = Memoizer::new(Arc::new(MokaStore::new()));
/// let report = memoizer
///     .memoize("daily-report", Duration::from_secs(120), || async {
///         Ok::<_, std::io::Error>(vec![1, 2, 3])
///     })
///     .await?;
/// assert_eq!(report, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Memoizer {
    inner: Arc<MemoizerInner>,
}

impl std::fmt::Debug for Memoizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoizer")
            .field("store", &self.inner.store.name())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Memoizer {
    /// Creates a memoizer with the default policy.
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self::with_config(store, MemoizeConfig::default())
    }

    /// Creates a memoizer with `config`.
    pub fn with_config(store: Arc<dyn SharedStore>, config: MemoizeConfig) -> Self {
        let locks = LockManager::new(Arc::clone(&store)).with_backoff(config.backoff.clone());
        Self {
            inner: Arc::new(MemoizerInner {
                store,
                locks,
                codec: KeyCodec::default(),
                config,
                in_flight: InFlight::new(),
            }),
        }
    }

    /// Uses `codec` to derive keys. Every process sharing records must use
    /// the same codec.
    pub fn with_key_codec(self, codec: KeyCodec) -> Self {
        let inner = &self.inner;
        Self {
            inner: Arc::new(MemoizerInner {
                store: Arc::clone(&inner.store),
                locks: inner.locks.clone(),
                codec,
                config: inner.config.clone(),
                in_flight: InFlight::new(),
            }),
        }
    }

    /// Policy of this memoizer.
    pub fn config(&self) -> &MemoizeConfig {
        &self.inner.config
    }

    /// Store key of the record for `name`.
    pub fn storage_key(&self, name: &str) -> String {
        self.inner.codec.memo_key(name)
    }

    /// Store key of the computation lock for `name`.
    pub fn lock_key(&self, name: &str) -> String {
        self.inner.codec.lock_key(name)
    }

    /// Returns the value memoized under `name`, computing it if no process
    /// has done so within the last `duration`.
    ///
    /// `compute` runs at most once across the fleet per window. Callers that
    /// lose the race wait for the winner's record for up to
    /// [`wait_timeout`](MemoizeConfig::wait_timeout). A failing `compute`
    /// leaves neither lock nor record behind, so the next call retries.
    #[tracing::instrument(level = "debug", skip(self, compute))]
    pub async fn memoize<V, F, Fut, E>(
        &self,
        name: &str,
        duration: Duration,
        compute: F,
    ) -> Result<V, MemoizeError>
    where
        V: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<BoxError>,
    {
        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let guard = loop {
            match self.inner.in_flight.check(SmolStr::new(name)) {
                ConcurrencyDecision::Proceed(guard) => break guard,
                ConcurrencyDecision::Await(waiter) => match waiter.wait().await {
                    Ok(Shared::Record(raw)) => {
                        return self.decode(&raw).map(MemoRecord::into_value);
                    }
                    Ok(Shared::TimedOut(waited)) => {
                        return Err(MemoizeError::LockTimeout {
                            name: name.to_owned(),
                            waited,
                        });
                    }
                    // The leader failed; take over.
                    Err(_) => {}
                },
            }
        };

        let result = self.resolve(name, duration, compute).await;
        let state = if result.is_ok() {
            MemoizeState::Done
        } else {
            MemoizeState::Failed
        };
        trace!(?state, "memoize finished");
        #[cfg(feature = "metrics")]
        metrics::histogram!(*MEMOIZE_DURATION).record(started.elapsed().as_secs_f64());

        match result {
            Ok((value, raw)) => {
                guard.complete(Shared::Record(raw));
                Ok(value)
            }
            Err(MemoizeError::LockTimeout { name, waited }) => {
                guard.complete(Shared::TimedOut(waited));
                Err(MemoizeError::LockTimeout { name, waited })
            }
            // Dropping the guard lets a waiting caller retry.
            Err(err) => Err(err),
        }
    }

    async fn resolve<V, F, Fut, E>(
        &self,
        name: &str,
        duration: Duration,
        compute: F,
    ) -> Result<(V, Raw), MemoizeError>
    where
        V: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<BoxError>,
    {
        trace!(state = ?MemoizeState::Idle);
        let storage_key = self.storage_key(name);
        if let Some(found) = self.read(&storage_key).await? {
            #[cfg(feature = "metrics")]
            metrics::counter!(*MEMOIZE_HIT).increment(1);
            return Ok(found);
        }

        trace!(state = ?MemoizeState::AcquiringLock);
        let config = &self.inner.config;
        let lock_key = self.lock_key(name);
        match self
            .inner
            .locks
            .acquire(&lock_key, config.lock_ttl, config.lock_wait)
            .await
        {
            Ok(lock) => self.compute_locked(lock, &storage_key, duration, compute).await,
            Err(LockError::Busy { .. }) => {
                self.wait_for_record(name, &storage_key, &lock_key, duration, compute)
                    .await
            }
            Err(LockError::Backend(err)) => Err(MemoizeError::StoreUnavailable(err)),
        }
    }

    async fn compute_locked<V, F, Fut, E>(
        &self,
        lock: LockGuard,
        storage_key: &str,
        duration: Duration,
        compute: F,
    ) -> Result<(V, Raw), MemoizeError>
    where
        V: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<BoxError>,
    {
        trace!(state = ?MemoizeState::Computing);
        let result: Result<(V, Raw), MemoizeError> = async {
            // The previous holder may have finished between our read and
            // our acquisition.
            if let Some(found) = self.read(storage_key).await? {
                return Ok(found);
            }
            let value = compute()
                .await
                .map_err(|err| MemoizeError::Compute(err.into()))?;
            let raw = self.inner.config.format.encode(&MemoRecord::new(&value, duration))?;
            self.inner
                .store
                .set(storage_key, raw.clone(), Some(duration))
                .await?;
            debug!(key = storage_key, ?duration, "memoized value stored");
            #[cfg(feature = "metrics")]
            metrics::counter!(*MEMOIZE_COMPUTED).increment(1);
            Ok((value, raw))
        }
        .await;

        match lock.release().await {
            Ok(ReleaseStatus::Released) => {}
            Ok(ReleaseStatus::NotOwned) => {
                warn!(key = storage_key, "computation outlived its lock, raise lock_ttl")
            }
            Err(err) => warn!(key = storage_key, error = %err, "failed to release memoize lock, it will expire"),
        }
        result
    }

    async fn wait_for_record<V, F, Fut, E>(
        &self,
        name: &str,
        storage_key: &str,
        lock_key: &str,
        duration: Duration,
        compute: F,
    ) -> Result<(V, Raw), MemoizeError>
    where
        V: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<BoxError>,
    {
        trace!(state = ?MemoizeState::Waiting);
        #[cfg(feature = "metrics")]
        metrics::counter!(*MEMOIZE_WAITED).increment(1);

        let config = &self.inner.config;
        let started = Instant::now();
        let deadline = deadline(started, config.wait_timeout);
        let mut delays = config.backoff.schedule();
        loop {
            let now = Instant::now();
            if now >= deadline {
                #[cfg(feature = "metrics")]
                metrics::counter!(*MEMOIZE_TIMEOUT).increment(1);
                return Err(MemoizeError::LockTimeout {
                    name: name.to_owned(),
                    waited: now - started,
                });
            }
            let delay = delays.next().unwrap_or(config.backoff.max);
            tokio::time::sleep(delay.min(deadline - now)).await;

            match self.read(storage_key).await {
                Ok(Some(found)) => return Ok(found),
                Ok(None) => {}
                Err(MemoizeError::StoreUnavailable(err)) => {
                    warn!(key = storage_key, error = %err, "record poll failed, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            }

            // A free lock without a record means the computer failed or
            // crashed; whoever takes the lock now may compute.
            match self.inner.locks.try_acquire(lock_key, config.lock_ttl).await {
                Ok(lock) => return self.compute_locked(lock, storage_key, duration, compute).await,
                Err(LockError::Busy { .. }) => {}
                Err(LockError::Backend(err)) => {
                    warn!(key = lock_key, error = %err, "lock retry failed");
                }
            }
        }
    }

    async fn read<V>(&self, storage_key: &str) -> Result<Option<(V, Raw)>, MemoizeError>
    where
        V: DeserializeOwned,
    {
        let Some(raw) = self.inner.store.get(storage_key).await? else {
            return Ok(None);
        };
        let record = self.decode::<V>(&raw)?;
        if record.is_expired() {
            return Ok(None);
        }
        Ok(Some((record.into_value(), raw)))
    }

    fn decode<V>(&self, raw: &[u8]) -> Result<MemoRecord<V>, MemoizeError>
    where
        V: DeserializeOwned,
    {
        Ok(self.inner.config.format.decode(raw)?)
    }

    /// Reads the record of `name` without computing anything.
    pub async fn peek<V>(&self, name: &str) -> Result<Option<V>, MemoizeError>
    where
        V: DeserializeOwned,
    {
        Ok(self
            .read(&self.storage_key(name))
            .await?
            .map(|(value, _)| value))
    }

    /// Deletes the record of `name`, so the next call computes again.
    pub async fn forget(&self, name: &str) -> Result<DeleteStatus, MemoizeError> {
        Ok(self.inner.store.delete(&self.storage_key(name)).await?)
    }
}
