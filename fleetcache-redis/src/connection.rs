use std::sync::Arc;

use redis::{Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::trace;

use crate::error::Error;

/// A client plus a lazily created, shared [`ConnectionManager`].
///
/// Clones share the manager, so a store and the bus derived from it use one
/// multiplexed connection for regular commands.
#[derive(Clone)]
pub(crate) struct LazyConnection {
    client: Client,
    manager: Arc<OnceCell<ConnectionManager>>,
}

impl LazyConnection {
    pub(crate) fn open(connection_info: &str) -> Result<Self, Error> {
        Ok(Self {
            client: Client::open(connection_info)?,
            manager: Arc::new(OnceCell::new()),
        })
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Returns a handle to the shared manager, connecting on first use.
    pub(crate) async fn manager(&self) -> Result<ConnectionManager, Error> {
        let manager = self
            .manager
            .get_or_try_init(|| {
                trace!("Initialize new redis connection manager");
                self.client.get_connection_manager()
            })
            .await?;
        Ok(manager.clone())
    }
}
