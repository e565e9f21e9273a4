// #![warn(missing_docs)]
//! Traits and structs for fleetcache's external collaborators.
//!
//! fleetcache coordinates processes through two pieces of shared
//! infrastructure and nothing else:
//!
//! - a [`SharedStore`]: key/value storage with TTLs and an atomic
//!   set-if-absent, reachable by every process;
//! - a [`PubSub`] bus fanning messages out to every subscribed process,
//!   at-least-once, with no ordering guarantee across channels.
//!
//! If you want to plug in your own store or bus, you are in the right place.
mod error;
pub mod format;
mod pubsub;
mod store;

pub use error::{BackendError, BoxError};
pub use format::{BincodeFormat, Format, FormatError, JsonFormat, ValueFormat};
pub use pubsub::{PubSub, Subscription};
pub use store::{BackendResult, SharedStore};

/// Status of deleting result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Records successfully deleted.
    Deleted(u32),
    /// Record already missing.
    Missing,
}

impl DeleteStatus {
    /// Whether anything was removed.
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteStatus::Deleted(n) if *n > 0)
    }
}

/// Enum for representing status of Lock object in backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// Lock successfully created and acquired.
    Acquired,
    /// Lock object already acquired (locked).
    Locked,
}
