//! In-process pub/sub bus built on tokio broadcast channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use fleetcache_backend::{BackendResult, PubSub, Subscription};
use fleetcache_core::Raw;
use futures::StreamExt;
use smol_str::SmolStr;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Broadcast channel capacity per bus channel.
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct MemoryBusInner {
    channels: DashMap<SmolStr, broadcast::Sender<Raw>>,
    capacity: usize,
    published: AtomicU64,
}

/// Pub/sub bus living inside one OS process.
///
/// Every clone shares the same channels. A subscriber that falls more than
/// `capacity` messages behind has its stream terminated instead of silently
/// skipping messages, so it resubscribes and resynchronises like after a
/// lost connection.
///
/// ```
/// use fleetcache_backend::PubSub;
/// use fleetcache_moka::MemoryBus;
/// use futures::StreamExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bus = MemoryBus::new();
/// let mut sub = bus.subscribe("news").await.unwrap();
/// bus.publish("news", "hello".into()).await.unwrap();
/// assert_eq!(sub.next().await.unwrap(), "hello");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBus {
    inner: Arc<MemoryBusInner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Creates a bus with the default per-channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering at most `capacity` undelivered messages per
    /// subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(MemoryBusInner {
                channels: DashMap::new(),
                capacity: capacity.max(1),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or_default()
    }

    /// Total number of messages published through this bus.
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::SeqCst)
    }

    /// Terminates every subscription on `channel`, as a lost connection would.
    pub fn disconnect(&self, channel: &str) {
        if self.inner.channels.remove(channel).is_some() {
            debug!(channel, "memory bus channel disconnected");
        }
    }
}

#[async_trait]
impl PubSub for MemoryBus {
    async fn publish(&self, channel: &str, payload: Raw) -> BackendResult<()> {
        self.inner.published.fetch_add(1, Ordering::SeqCst);
        if let Some(sender) = self.inner.channels.get(channel) {
            // No receivers is not an error: nobody is listening yet.
            let _ = sender.send(payload);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BackendResult<Subscription> {
        let receiver = self
            .inner
            .channels
            .entry(SmolStr::new(channel))
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe();

        let channel = SmolStr::new(channel);
        let stream = futures::stream::unfold(receiver, move |mut receiver| {
            let channel = channel.clone();
            async move {
                match receiver.recv().await {
                    Ok(payload) => Some((payload, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%channel, skipped, "memory bus subscriber lagged, closing subscription");
                        None
                    }
                    Err(RecvError::Closed) => None,
                }
            }
        });
        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
