use std::sync::Arc;

use async_trait::async_trait;
use fleetcache_core::Raw;
use futures::stream::BoxStream;

use crate::BackendResult;

/// Stream of payloads published on one channel.
///
/// The stream ends when the underlying connection is lost; subscribers are
/// expected to resubscribe.
pub type Subscription = BoxStream<'static, Raw>;

/// Publish/subscribe bus shared by every process of the fleet.
///
/// Delivery is at-least-once to every subscriber connected when the message
/// is published. There is no durability: a subscriber that was disconnected
/// misses the messages published meanwhile.
#[async_trait]
pub trait PubSub: Sync + Send {
    /// Fans `payload` out to every current subscriber of `channel`.
    async fn publish(&self, channel: &str, payload: Raw) -> BackendResult<()>;

    /// Subscribes to `channel`.
    ///
    /// Once this returns, every message published afterwards is delivered
    /// to the returned stream.
    async fn subscribe(&self, channel: &str) -> BackendResult<Subscription>;

    /// Returns the name of this bus for logs and metrics labels.
    fn name(&self) -> &str {
        "bus"
    }
}

#[async_trait]
impl<T> PubSub for Box<T>
where
    T: PubSub + ?Sized,
{
    async fn publish(&self, channel: &str, payload: Raw) -> BackendResult<()> {
        (**self).publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> BackendResult<Subscription> {
        (**self).subscribe(channel).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T> PubSub for Arc<T>
where
    T: PubSub + ?Sized,
{
    async fn publish(&self, channel: &str, payload: Raw) -> BackendResult<()> {
        (**self).publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> BackendResult<Subscription> {
        (**self).subscribe(channel).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
