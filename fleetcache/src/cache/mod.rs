//! Distributed cache: a local mirror per process, a shared store behind it
//! and pub/sub invalidation between them.

mod listener;
pub mod mirror;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use fleetcache_backend::{BoxError, Format, JsonFormat, PubSub, SharedStore, ValueFormat};
use fleetcache_core::{
    Envelope, InvalidationMessage, KeyCodec, Namespace, ProcessId, Version, VersionClock,
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, trace, warn};

#[cfg(feature = "metrics")]
use crate::metrics::{
    INVALIDATIONS_PUBLISHED, MIRROR_HIT_COUNTER, MIRROR_MISS_COUNTER, STORE_READ_ERRORS,
};

use self::listener::{Listener, ListenerHandle};
use self::mirror::LocalMirror;
use crate::concurrency::{ConcurrencyDecision, InFlight};
use crate::config::CacheConfig;
use crate::error::CacheError;

struct CacheInner<V> {
    namespace: Namespace,
    codec: KeyCodec,
    channel: String,
    process: ProcessId,
    store: Arc<dyn SharedStore>,
    bus: Arc<dyn PubSub>,
    format: ValueFormat,
    ttl: Option<Duration>,
    clock: Arc<VersionClock>,
    mirror: Arc<LocalMirror<V>>,
    in_flight: InFlight<String, V>,
    _listener: ListenerHandle,
}

/// A named cache whose entries live in a shared store and are mirrored in
/// every process that reads them.
///
/// Writes go to the store first, then to the local mirror, then an
/// invalidation is published so that other processes evict their copy.
/// Reads are served by the mirror and fall back to the store. Clones share
/// the same mirror and listener; the listener stops when the last clone is
/// dropped.
///
/// `V` may be an `Option<T>`: storing `None` caches "no value", which
/// [`get`](Self::get) returns as `Some(None)`.
///
/// ```
/// use std::sync::Arc;
/// use fleetcache::DistributedCache;
/// use fleetcache_moka::{MemoryBus, MokaStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), fleetcache::CacheError> {
/// let cache: DistributedCache<String> = DistributedCache::builder(
///     "settings",
///     Arc::new(MokaStore::new()),
///     Arc::new(MemoryBus::new()),
/// )
/// .build()
/// .await?;
///
/// cache.set("theme", "dark".to_owned()).await?;
/// assert_eq!(cache.get("theme").await.as_deref(), Some("dark"));
/// # Ok(())
/// # }
/// ```
pub struct DistributedCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for DistributedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for DistributedCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedCache")
            .field("namespace", &self.inner.namespace)
            .field("process", &self.inner.process)
            .field("store", &self.inner.store.name())
            .field("bus", &self.inner.bus.name())
            .finish()
    }
}

impl<V> DistributedCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Starts building a cache for `namespace`.
    pub fn builder(
        namespace: impl Into<String>,
        store: Arc<dyn SharedStore>,
        bus: Arc<dyn PubSub>,
    ) -> DistributedCacheBuilder<V> {
        DistributedCacheBuilder {
            namespace: namespace.into(),
            store,
            bus,
            config: CacheConfig::default(),
            codec: KeyCodec::default(),
            _value: PhantomData,
        }
    }

    /// Namespace of this cache.
    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    /// Origin id stamped on the invalidations this instance publishes.
    pub fn process_id(&self) -> &ProcessId {
        &self.inner.process
    }

    /// Shared store key holding `key`.
    pub fn store_key(&self, key: &str) -> String {
        self.inner.codec.cache_key(&self.inner.namespace, key)
    }

    /// Number of entries in the local mirror.
    pub fn local_len(&self) -> usize {
        self.inner.mirror.len()
    }

    /// Whether the local mirror holds `key`.
    pub fn contains_local(&self, key: &str) -> bool {
        self.inner.mirror.contains(key)
    }

    /// Returns the value of `key`, or `None` if it was never set or was
    /// cleared.
    ///
    /// Shared store failures are logged and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.inner.mirror.get(key) {
            trace!(namespace = %self.inner.namespace, key, "mirror hit");
            #[cfg(feature = "metrics")]
            metrics::counter!(*MIRROR_HIT_COUNTER, "namespace" => self.inner.namespace.to_string())
                .increment(1);
            return Some(value);
        }
        #[cfg(feature = "metrics")]
        metrics::counter!(*MIRROR_MISS_COUNTER, "namespace" => self.inner.namespace.to_string())
            .increment(1);
        self.load(key).await
    }

    async fn load(&self, key: &str) -> Option<V> {
        let inner = &self.inner;
        let store_key = self.store_key(key);
        let ticket = inner.mirror.read_ticket(key);
        let raw = match inner.store.get(&store_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                inner.mirror.discard(key, ticket);
                return None;
            }
            Err(err) => {
                warn!(namespace = %inner.namespace, key, store = inner.store.name(), error = %err, "shared store read failed, treating as miss");
                #[cfg(feature = "metrics")]
                metrics::counter!(*STORE_READ_ERRORS, "namespace" => inner.namespace.to_string())
                    .increment(1);
                inner.mirror.discard(key, ticket);
                return None;
            }
        };
        let envelope: Envelope<V> = match inner.format.decode(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(namespace = %inner.namespace, key, error = %err, "undecodable cache entry, treating as miss");
                inner.mirror.discard(key, ticket);
                return None;
            }
        };

        inner.clock.observe(envelope.version());
        let (version, value) = envelope.into_parts();
        let admitted = inner.mirror.populate(key, value.clone(), version, ticket);
        trace!(namespace = %inner.namespace, key, %version, admitted, "loaded from shared store");
        Some(value)
    }

    /// Stores `value` under `key` for every process.
    ///
    /// The local mirror is updated before this returns, unless another
    /// write or an invalidation of `key` overlapped this one; then the
    /// entry is dropped and the next read goes to the store. Other processes
    /// see the value once they process the invalidation.
    pub async fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        let inner = &self.inner;
        let version = inner.clock.tick();
        let raw = inner.format.encode(&Envelope::new(version, &value))?;
        let ticket = inner.mirror.begin_write(key);
        if let Err(err) = inner.store.set(&self.store_key(key), raw, inner.ttl).await {
            inner.mirror.finish_write(key, ticket, None);
            return Err(err.into());
        }
        let cached = inner.mirror.finish_write(key, ticket, Some((value, version)));
        debug!(namespace = %inner.namespace, key, %version, cached, "cache entry written");

        self.publish(InvalidationMessage::key(
            inner.namespace.clone(),
            key,
            version,
            inner.process.clone(),
        ))
        .await
    }

    /// Returns the cached value of `key`, computing and storing it first if
    /// this process has none.
    ///
    /// Concurrent calls for the same key in this process run `compute`
    /// once; the others wait for its result. If `compute` fails, its error
    /// is returned to that caller and a waiting caller computes instead.
    /// The shared store is not read: the computation defines the value.
    pub async fn defer_get_set<F, Fut, E>(&self, key: &str, compute: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<BoxError>,
    {
        let guard = loop {
            if let Some(value) = self.inner.mirror.get(key) {
                return Ok(value);
            }
            match self.inner.in_flight.check(key.to_owned()) {
                ConcurrencyDecision::Proceed(guard) => break guard,
                ConcurrencyDecision::Await(waiter) => {
                    if let Ok(value) = waiter.wait().await {
                        return Ok(value);
                    }
                    trace!(namespace = %self.inner.namespace, key, "in-flight computation abandoned, retrying");
                }
            }
        };

        // Completed between the mirror check and the registration.
        if let Some(value) = self.inner.mirror.get(key) {
            return Ok(value);
        }

        let value = compute()
            .await
            .map_err(|err| CacheError::Compute(err.into()))?;
        self.set(key, value.clone()).await?;
        guard.complete(value.clone());
        Ok(value)
    }

    /// Removes `key` locally, from the shared store and from every other
    /// process.
    pub async fn clear(&self, key: &str) -> Result<(), CacheError> {
        let inner = &self.inner;
        let version = inner.clock.tick();
        let ticket = inner.mirror.begin_write(key);
        let deleted = inner.store.delete(&self.store_key(key)).await;
        inner.mirror.finish_write(key, ticket, None);
        deleted?;
        self.publish(InvalidationMessage::key(
            inner.namespace.clone(),
            key,
            version,
            inner.process.clone(),
        ))
        .await
    }

    /// Removes every key of the namespace locally, from the shared store and
    /// from every other process.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        let inner = &self.inner;
        let version = inner.clock.tick();
        let evicted = inner.mirror.invalidate_all();
        let deleted = inner
            .store
            .delete_prefix(&inner.codec.cache_prefix(&inner.namespace))
            .await;
        // Reads that overlapped the delete may have cached doomed entries.
        inner.mirror.invalidate_all();
        let deleted = deleted?;
        debug!(namespace = %inner.namespace, %version, evicted, ?deleted, "namespace cleared");
        self.publish(InvalidationMessage::all(
            inner.namespace.clone(),
            version,
            inner.process.clone(),
        ))
        .await
    }

    async fn publish(&self, message: InvalidationMessage) -> Result<(), CacheError> {
        let inner = &self.inner;
        let payload = JsonFormat.encode(&message)?;
        if let Err(err) = inner.bus.publish(&inner.channel, payload).await {
            warn!(namespace = %inner.namespace, bus = inner.bus.name(), error = %err, "invalidation publish failed, peers may serve stale data");
            return Err(err.into());
        }
        #[cfg(feature = "metrics")]
        metrics::counter!(*INVALIDATIONS_PUBLISHED, "namespace" => inner.namespace.to_string())
            .increment(1);
        Ok(())
    }

    /// Latest version this instance issued or observed.
    pub fn last_version(&self) -> Version {
        self.inner.clock.last()
    }
}

/// Builder for [`DistributedCache`].
///
/// Use [`DistributedCache::builder`] to create one.
pub struct DistributedCacheBuilder<V> {
    namespace: String,
    store: Arc<dyn SharedStore>,
    bus: Arc<dyn PubSub>,
    config: CacheConfig,
    codec: KeyCodec,
    _value: PhantomData<fn() -> V>,
}

impl<V> DistributedCacheBuilder<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Sets the cache configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the key codec, e.g. to use a prefix other than `fleetcache`.
    ///
    /// Every process sharing the namespace must use the same codec.
    pub fn key_codec(mut self, codec: KeyCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Validates the namespace, subscribes to its invalidation channel and
    /// starts the listener.
    ///
    /// Must be called within a tokio runtime.
    pub async fn build(self) -> Result<DistributedCache<V>, CacheError> {
        let namespace = Namespace::new(self.namespace)?;
        let channel = self.codec.channel(&namespace);
        let process = ProcessId::generate();
        let clock = Arc::new(VersionClock::new());
        let mirror = Arc::new(LocalMirror::new(self.config.ttl));

        let listener = Listener {
            namespace: namespace.clone(),
            channel: channel.clone(),
            process: process.clone(),
            mirror: Arc::clone(&mirror),
            clock: Arc::clone(&clock),
            bus: Arc::clone(&self.bus),
            config: self.config.listener.clone(),
        }
        .spawn()
        .await?;

        debug!(%namespace, %process, store = self.store.name(), bus = self.bus.name(), "distributed cache ready");
        Ok(DistributedCache {
            inner: Arc::new(CacheInner {
                namespace,
                codec: self.codec,
                channel,
                process,
                store: self.store,
                bus: self.bus,
                format: self.config.format,
                ttl: self.config.ttl,
                clock,
                mirror,
                in_flight: InFlight::new(),
                _listener: listener,
            }),
        })
    }
}
