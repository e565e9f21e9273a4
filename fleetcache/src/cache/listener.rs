//! Background task applying invalidation messages to a local mirror.

use std::sync::Arc;

use fleetcache_backend::{BackendError, Format, JsonFormat, PubSub, Subscription};
use fleetcache_core::{InvalidationMessage, InvalidationTarget, Namespace, ProcessId, VersionClock};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "metrics")]
use crate::metrics::{INVALIDATIONS_APPLIED, INVALIDATIONS_IGNORED, LISTENER_RESUBSCRIBED};

use super::mirror::LocalMirror;
use crate::config::ListenerConfig;

/// What the listener did with one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Entries were evicted.
    Evicted(usize),
    /// Nothing was cached for the target.
    NotCached,
    /// Produced by this instance; its mirror is already up to date.
    OwnEcho,
    /// Addressed to another namespace sharing the channel.
    ForeignNamespace,
    /// Not a decodable invalidation message.
    Malformed,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Evicted(_) => "evicted",
            Outcome::NotCached => "not_cached",
            Outcome::OwnEcho => "own_echo",
            Outcome::ForeignNamespace => "foreign_namespace",
            Outcome::Malformed => "malformed",
        }
    }
}

/// Owns the listener task; aborts it, and so drops the subscription, when
/// dropped.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    handle: JoinHandle<()>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) struct Listener<V> {
    pub(crate) namespace: Namespace,
    pub(crate) channel: String,
    pub(crate) process: ProcessId,
    pub(crate) mirror: Arc<LocalMirror<V>>,
    pub(crate) clock: Arc<VersionClock>,
    pub(crate) bus: Arc<dyn PubSub>,
    pub(crate) config: ListenerConfig,
}

impl<V> Listener<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Subscribes now and processes messages on a background task.
    ///
    /// Subscribing before returning means no message published after the
    /// owning cache is built can be missed.
    pub(crate) async fn spawn(self) -> Result<ListenerHandle, BackendError> {
        let subscription = self.bus.subscribe(&self.channel).await?;
        debug!(namespace = %self.namespace, channel = %self.channel, "invalidation listener subscribed");
        let handle = tokio::spawn(self.run(subscription));
        Ok(ListenerHandle { handle })
    }

    async fn run(self, mut subscription: Subscription) {
        loop {
            while let Some(payload) = subscription.next().await {
                let outcome = self.apply(&payload);
                trace!(namespace = %self.namespace, outcome = outcome.label(), "invalidation processed");
                #[cfg(feature = "metrics")]
                {
                    let counter = match outcome {
                        Outcome::Evicted(_) | Outcome::NotCached => *INVALIDATIONS_APPLIED,
                        _ => *INVALIDATIONS_IGNORED,
                    };
                    metrics::counter!(counter, "namespace" => self.namespace.to_string(), "outcome" => outcome.label())
                        .increment(1);
                }
            }

            // Messages may have been lost while disconnected.
            warn!(namespace = %self.namespace, "invalidation subscription ended, resetting local mirror");
            self.mirror.invalidate_all();
            subscription = self.resubscribe().await;
            self.mirror.invalidate_all();
            #[cfg(feature = "metrics")]
            metrics::counter!(*LISTENER_RESUBSCRIBED, "namespace" => self.namespace.to_string())
                .increment(1);
        }
    }

    async fn resubscribe(&self) -> Subscription {
        let mut backoff = self.config.reconnect_initial;
        loop {
            tokio::time::sleep(backoff).await;
            match self.bus.subscribe(&self.channel).await {
                Ok(subscription) => {
                    info!(namespace = %self.namespace, "invalidation listener resubscribed");
                    return subscription;
                }
                Err(err) => {
                    error!(
                        namespace = %self.namespace,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "invalidation listener failed to resubscribe"
                    );
                    backoff = self.config.next_delay(backoff);
                }
            }
        }
    }

    pub(crate) fn apply(&self, payload: &[u8]) -> Outcome {
        let message: InvalidationMessage = match JsonFormat.decode(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(namespace = %self.namespace, error = %err, "dropping malformed invalidation message");
                return Outcome::Malformed;
            }
        };
        if message.namespace != self.namespace {
            return Outcome::ForeignNamespace;
        }
        if message.is_from(&self.process) {
            return Outcome::OwnEcho;
        }

        // Versions from other hosts do not order writes in the store, so
        // every peer message evicts; a redundant eviction costs one read.
        self.clock.observe(message.version);
        let evicted = match &message.target {
            InvalidationTarget::Key(key) => usize::from(self.mirror.invalidate(key)),
            InvalidationTarget::All => self.mirror.invalidate_all(),
        };
        debug!(
            namespace = %self.namespace,
            target = ?message.target,
            version = %message.version,
            origin = %message.origin,
            evicted,
            "invalidation applied"
        );
        if evicted > 0 {
            Outcome::Evicted(evicted)
        } else {
            Outcome::NotCached
        }
    }
}
