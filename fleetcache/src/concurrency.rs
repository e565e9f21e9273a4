use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::broadcast;

/// Result of a concurrency check: compute the value, or wait for the caller
/// that already is.
pub enum ConcurrencyDecision<K, V>
where
    K: Eq + Hash,
{
    /// This caller computes and must hand the value over through the guard.
    Proceed(CompletionGuard<K, V>),
    /// Another caller in this process is computing.
    Await(Waiter<V>),
}

/// The computing caller went away without producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConcurrencyError {
    /// The guard was dropped without [`CompletionGuard::complete`]; the
    /// waiter should check again and possibly compute itself.
    #[error("in-flight computation was abandoned")]
    Abandoned,
}

/// Per-key single-assignment handoff between tasks of one process.
///
/// The first caller for a key gets [`ConcurrencyDecision::Proceed`]; every
/// caller arriving while it runs gets a [`Waiter`] that resolves to the
/// value passed to [`CompletionGuard::complete`]. Keys are independent.
///
/// ```
/// use fleetcache::concurrency::{ConcurrencyDecision, InFlight};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let in_flight: InFlight<&str, u32> = InFlight::new();
/// let ConcurrencyDecision::Proceed(guard) = in_flight.check("answer") else {
///     unreachable!()
/// };
/// let ConcurrencyDecision::Await(waiter) = in_flight.check("answer") else {
///     unreachable!()
/// };
/// guard.complete(42);
/// assert_eq!(waiter.wait().await, Ok(42));
/// # }
/// ```
pub struct InFlight<K, V>
where
    K: Eq + Hash,
{
    pending: Arc<DashMap<K, broadcast::Sender<V>>>,
}

impl<K, V> Clone for InFlight<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<K, V> Default for InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty handoff.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Registers the caller as computer of `key`, or subscribes it to the
    /// computation already in flight.
    pub fn check(&self, key: K) -> ConcurrencyDecision<K, V> {
        match self.pending.entry(key) {
            Entry::Occupied(entry) => ConcurrencyDecision::Await(Waiter {
                receiver: entry.get().subscribe(),
            }),
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                let (sender, _) = broadcast::channel(1);
                entry.insert(sender.clone());
                ConcurrencyDecision::Proceed(CompletionGuard {
                    key: Some(key),
                    sender,
                    pending: Arc::clone(&self.pending),
                })
            }
        }
    }

    /// Whether a computation for `key` is in flight.
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of keys being computed.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Held by the computing caller.
///
/// Dropping it without completing clears the marker and wakes every waiter
/// with [`ConcurrencyError::Abandoned`].
pub struct CompletionGuard<K, V>
where
    K: Eq + Hash,
{
    key: Option<K>,
    sender: broadcast::Sender<V>,
    pending: Arc<DashMap<K, broadcast::Sender<V>>>,
}

impl<K, V> CompletionGuard<K, V>
where
    K: Eq + Hash,
{
    /// Clears the marker and hands `value` to every waiter.
    pub fn complete(mut self, value: V) {
        self.clear();
        // No receivers means nobody waited.
        let _ = self.sender.send(value);
    }

    fn clear(&mut self) {
        if let Some(key) = self.key.take() {
            self.pending
                .remove_if(&key, |_, sender| sender.same_channel(&self.sender));
        }
    }
}

impl<K, V> Drop for CompletionGuard<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.clear();
    }
}

/// Receives the value of a computation running elsewhere in the process.
pub struct Waiter<V> {
    receiver: broadcast::Receiver<V>,
}

impl<V> Waiter<V>
where
    V: Clone,
{
    /// Waits for the computing caller.
    pub async fn wait(mut self) -> Result<V, ConcurrencyError> {
        self.receiver
            .recv()
            .await
            .map_err(|_| ConcurrencyError::Abandoned)
    }
}
