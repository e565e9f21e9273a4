//! Error types for backend operations.

use crate::format::FormatError;
use thiserror::Error;

/// Boxed error used for wrapped third-party failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for shared store and pub/sub operations.
///
/// This enum categorizes errors that can occur while talking to the
/// fleet's shared infrastructure into distinct groups for appropriate
/// handling. Every variant means the store or bus is (transiently)
/// unavailable from the caller's point of view.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Internal backend error, state or computation error.
    ///
    /// Any error not related to network interaction.
    #[error(transparent)]
    InternalError(BoxError),

    /// Network interaction error.
    ///
    /// Errors occurring during communication with remote backends (e.g., Redis).
    #[error(transparent)]
    ConnectionError(BoxError),

    /// Serialization or deserialization error.
    #[error(transparent)]
    FormatError(#[from] FormatError),
}

impl BackendError {
    /// Wraps an arbitrary error as an internal error.
    pub fn internal(error: impl Into<BoxError>) -> Self {
        Self::InternalError(error.into())
    }

    /// Wraps an arbitrary error as a connection error.
    pub fn connection(error: impl Into<BoxError>) -> Self {
        Self::ConnectionError(error.into())
    }
}
