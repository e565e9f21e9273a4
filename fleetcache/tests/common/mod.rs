//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fleetcache_backend::{
    BackendError, BackendResult, DeleteStatus, LockStatus, PubSub, SharedStore, Subscription,
};
use fleetcache_core::Raw;
use fleetcache_moka::{MemoryBus, MokaStore};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Wraps a future-returning computation and counts how often it ran.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// A computation returning `value` after `delay`.
    pub fn compute<V>(
        &self,
        delay: Duration,
        value: V,
    ) -> impl FnOnce() -> BoxFuture<'static, io::Result<V>> + use<V>
    where
        V: Send + 'static,
    {
        let calls = Arc::clone(&self.0);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }

    /// A computation that fails.
    pub fn failing<V>(&self) -> impl FnOnce() -> BoxFuture<'static, io::Result<V>> + use<V>
    where
        V: Send + 'static,
    {
        let calls = Arc::clone(&self.0);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(io::Error::other("boom"))
            }
            .boxed()
        }
    }
}

/// A [`MemoryBus`] that counts publishes.
#[derive(Clone, Default)]
pub struct CountingBus {
    pub inner: MemoryBus,
    published: Arc<AtomicUsize>,
}

impl CountingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PubSub for CountingBus {
    async fn publish(&self, channel: &str, payload: Raw) -> BackendResult<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> BackendResult<Subscription> {
        self.inner.subscribe(channel).await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// A bus whose publishes reach subscribers only after `delay`.
#[derive(Clone)]
pub struct DelayedBus {
    pub inner: MemoryBus,
    delay: Duration,
}

impl DelayedBus {
    pub fn new(inner: MemoryBus, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl PubSub for DelayedBus {
    async fn publish(&self, channel: &str, payload: Raw) -> BackendResult<()> {
        let inner = self.inner.clone();
        let channel = channel.to_owned();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inner.publish(&channel, payload).await;
        });
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BackendResult<Subscription> {
        self.inner.subscribe(channel).await
    }

    fn name(&self) -> &str {
        "delayed"
    }
}

/// A [`MokaStore`] whose reads and writes can be switched to fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MokaStore,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    next_write_delay_ms: Arc<AtomicU64>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Holds the next `set` for `delay` before it reaches the store.
    pub fn delay_next_write(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.next_write_delay_ms.store(millis, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> BackendResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(BackendError::connection("store is down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SharedStore for FlakyStore {
    async fn get(&self, key: &str) -> BackendResult<Option<Raw>> {
        Self::check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Raw, ttl: Option<Duration>) -> BackendResult<()> {
        Self::check(&self.fail_writes)?;
        let delay = self.next_write_delay_ms.swap(0, Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> BackendResult<DeleteStatus> {
        Self::check(&self.fail_writes)?;
        self.inner.delete(key).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Raw,
        ttl: Duration,
    ) -> BackendResult<LockStatus> {
        Self::check(&self.fail_writes)?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> BackendResult<DeleteStatus> {
        Self::check(&self.fail_writes)?;
        self.inner.delete_if_equals(key, expected).await
    }

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<DeleteStatus> {
        Self::check(&self.fail_writes)?;
        self.inner.delete_prefix(prefix).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}
