#![warn(missing_docs)]
//! # fleetcache-core
//!
//! Core types shared by the fleetcache crates.
//!
//! Every process of a fleet talks to the same shared store and the same
//! pub/sub bus, so all of them must agree on three things: how logical names
//! map to store keys and channels, how writes are ordered, and what travels
//! over the wire. This crate pins those down:
//!
//! - **Key codec** ([`KeyCodec`], [`Namespace`]) - deterministic, collision-free
//!   store keys and channel names
//! - **Ordering** ([`Version`], [`VersionClock`]) - hybrid logical clock stamps
//!   used to decide whether an invalidation is superseded
//! - **Wire types** ([`Envelope`], [`MemoRecord`], [`InvalidationMessage`])
//! - **Identity** ([`ProcessId`], [`LockToken`])
//!

pub mod key;
pub mod label;
pub mod message;
pub mod value;
pub mod version;

pub use key::{KeyCodec, KeyError, KeyKind, Namespace};
pub use label::{LockToken, ProcessId};
pub use message::{InvalidationMessage, InvalidationTarget};
pub use value::{Envelope, MemoRecord};
pub use version::{Version, VersionClock};

#[doc(hidden)]
pub use smol_str::SmolStr;

/// Raw byte data type used for serialized values and bus payloads.
/// Using `Bytes` provides efficient zero-copy cloning via reference counting.
pub type Raw = bytes::Bytes;
