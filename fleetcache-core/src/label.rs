//! Identity types.
//!
//! [`ProcessId`] names the origin of an invalidation so a process can
//! recognise its own echo; [`LockToken`] names one lock acquisition so a
//! holder can only release the lock it actually owns.

use smol_str::SmolStr;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one cache or memoizer instance.
///
/// Randomly generated, so several instances living in the same OS process
/// are still distinct origins.
///
/// # Example
/// ```
/// use fleetcache_core::ProcessId;
///
/// let a = ProcessId::generate();
/// let b = ProcessId::generate();
/// assert_ne!(a, b);
/// assert_eq!(ProcessId::new("worker-1").as_str(), "worker-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(SmolStr);

impl ProcessId {
    /// Creates a process id from an explicit name.
    #[inline]
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    /// Generates a fresh random process id.
    pub fn generate() -> Self {
        Self(SmolStr::from(Uuid::new_v4().to_string()))
    }

    /// Returns the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Proof of one lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(SmolStr);

impl LockToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(SmolStr::from(Uuid::new_v4().to_string()))
    }

    /// Returns the token as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the token as bytes, the form stored under the lock key.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
