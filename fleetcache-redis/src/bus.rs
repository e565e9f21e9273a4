//! Redis pub/sub bus implementation.

use async_trait::async_trait;
use bytes::Bytes;
use fleetcache_backend::{BackendResult, PubSub, Subscription};
use fleetcache_core::Raw;
use futures::StreamExt;
use tracing::debug;

use crate::connection::LazyConnection;
use crate::error::Error;

/// Pub/sub bus over Redis `PUBLISH` and `SUBSCRIBE`.
///
/// Publishing goes through the shared connection manager. Every call to
/// [`subscribe`](PubSub::subscribe) opens a dedicated pub/sub connection
/// whose stream ends when that connection is lost; callers resubscribe.
#[derive(Clone)]
pub struct RedisBus {
    connection: LazyConnection,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus").finish_non_exhaustive()
    }
}

impl RedisBus {
    /// Creates a bus for the server at `connection_info`.
    pub fn new(connection_info: impl AsRef<str>) -> Result<Self, Error> {
        Ok(Self::from_connection(LazyConnection::open(
            connection_info.as_ref(),
        )?))
    }

    pub(crate) fn from_connection(connection: LazyConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl PubSub for RedisBus {
    async fn publish(&self, channel: &str, payload: Raw) -> BackendResult<()> {
        let mut con = self.connection.manager().await?;
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload.as_ref())
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        debug!(channel, receivers, "published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BackendResult<Subscription> {
        let mut pubsub = self
            .connection
            .client()
            .get_async_pubsub()
            .await
            .map_err(Error::from)?;
        pubsub.subscribe(channel).await.map_err(Error::from)?;
        debug!(channel, "subscribed");

        let stream = pubsub
            .into_on_message()
            .map(|msg| Bytes::copy_from_slice(msg.get_payload_bytes()));
        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "redis"
    }
}
