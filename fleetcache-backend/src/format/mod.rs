//! Value serialization formats.
//!
//! Cached values and memoization records are serialized before they reach
//! the shared store. All processes of a fleet must use the same format for
//! the same keys.
//!
//! | Format | Size | Human readable |
//! |--------|------|----------------|
//! | [`JsonFormat`] | Larger | Yes (default) |
//! | [`BincodeFormat`] | Compact | No |
//!
//! [`ValueFormat`] selects one of them at runtime, for example from
//! configuration:
//!
//! ```
//! use fleetcache_backend::format::{Format, ValueFormat};
//!
//! let format: ValueFormat = serde_json::from_str("\"bincode\"").unwrap();
//! let raw = format.encode(&Some(42u32)).unwrap();
//! let back: Option<u32> = format.decode(&raw).unwrap();
//! assert_eq!(back, Some(42));
//! ```

use fleetcache_core::Raw;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

mod bincode;
mod json;

pub use bincode::BincodeFormat;
pub use json::JsonFormat;

use crate::error::BoxError;

/// Serialization failure.
#[derive(Error, Debug)]
pub enum FormatError {
    /// Value could not be serialized.
    #[error("serialize: {0}")]
    Serialize(BoxError),

    /// Stored bytes could not be deserialized.
    #[error("deserialize: {0}")]
    Deserialize(BoxError),
}

/// Unique identifier for format types, used to compare format equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTypeId {
    /// [`JsonFormat`].
    Json,
    /// [`BincodeFormat`].
    Bincode,
}

/// Converts values to and from stored bytes.
pub trait Format: Send + Sync {
    /// Serializes `value`.
    fn encode<T>(&self, value: &T) -> Result<Raw, FormatError>
    where
        T: Serialize + ?Sized;

    /// Deserializes `data`.
    fn decode<T>(&self, data: &[u8]) -> Result<T, FormatError>
    where
        T: DeserializeOwned;

    /// Identifier of this format.
    fn format_type_id(&self) -> FormatTypeId;
}

/// Runtime-selectable [`Format`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    /// [`JsonFormat`].
    #[default]
    Json,
    /// [`BincodeFormat`].
    Bincode,
}

impl Format for ValueFormat {
    fn encode<T>(&self, value: &T) -> Result<Raw, FormatError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            ValueFormat::Json => JsonFormat.encode(value),
            ValueFormat::Bincode => BincodeFormat.encode(value),
        }
    }

    fn decode<T>(&self, data: &[u8]) -> Result<T, FormatError>
    where
        T: DeserializeOwned,
    {
        match self {
            ValueFormat::Json => JsonFormat.decode(data),
            ValueFormat::Bincode => BincodeFormat.decode(data),
        }
    }

    fn format_type_id(&self) -> FormatTypeId {
        match self {
            ValueFormat::Json => FormatTypeId::Json,
            ValueFormat::Bincode => FormatTypeId::Bincode,
        }
    }
}
