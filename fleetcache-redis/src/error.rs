//! Error types for Redis store and bus operations.
//!
//! All errors convert into [`BackendError`] so the cache and memoizer can
//! treat Redis like any other collaborator.
//!
//! [`BackendError`]: fleetcache_backend::BackendError

use fleetcache_backend::BackendError;
use redis::RedisError;

/// Error type for Redis operations.
///
/// # When You'll Encounter This
///
/// - [`RedisStoreBuilder::build`] with an invalid connection URL
/// - The first operation when Redis is unreachable (connections are
///   established lazily)
/// - Any command the server rejects
///
/// [`RedisStoreBuilder::build`]: crate::RedisStoreBuilder::build
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
}

impl Error {
    fn is_connection(&self) -> bool {
        match self {
            Error::Redis(error) => {
                error.is_io_error()
                    || error.is_connection_dropped()
                    || error.is_connection_refusal()
                    || error.is_timeout()
            }
        }
    }
}

impl From<Error> for BackendError {
    fn from(error: Error) -> Self {
        if error.is_connection() {
            Self::ConnectionError(Box::new(error))
        } else {
            Self::InternalError(Box::new(error))
        }
    }
}
