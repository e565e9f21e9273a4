//! Write ordering across processes.
//!
//! Every write to a distributed cache is stamped with a [`Version`] taken
//! from the writer's [`VersionClock`], a hybrid logical clock: the stamp is
//! the wall clock in milliseconds, bumped past anything the clock has issued
//! or observed before. Processes observe the versions carried by
//! invalidation messages and store envelopes, so a write issued after seeing
//! another write is always ordered after it, even when wall clocks disagree.
//!
//! A version packs the millisecond timestamp into the upper 48 bits and a
//! logical counter into the lower 16 bits, so comparing versions is a plain
//! integer comparison.
//!
//! ```
//! use fleetcache_core::{Version, VersionClock};
//!
//! let clock = VersionClock::new();
//! let a = clock.tick();
//! let b = clock.tick();
//! assert!(b > a);
//!
//! // Observing a version from the future pulls the clock forward.
//! let remote = Version::from_parts(a.millis() + 60_000, 3);
//! clock.observe(remote);
//! assert!(clock.tick() > remote);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

const COUNTER_BITS: u32 = 16;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

/// A totally ordered write stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The smallest version; older than every issued stamp.
    pub const ZERO: Version = Version(0);

    /// Builds a version from a millisecond timestamp and a logical counter.
    pub fn from_parts(millis: u64, counter: u16) -> Self {
        Version((millis << COUNTER_BITS) | u64::from(counter))
    }

    /// Millisecond component.
    pub fn millis(&self) -> u64 {
        self.0 >> COUNTER_BITS
    }

    /// Logical counter component.
    pub fn counter(&self) -> u16 {
        (self.0 & COUNTER_MASK) as u16
    }

    /// Raw packed representation.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Version(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.millis(), self.counter())
    }
}

/// Hybrid logical clock issuing [`Version`]s.
///
/// Lock-free; safe to share between tasks.
#[derive(Debug, Default)]
pub struct VersionClock {
    last: AtomicU64,
}

impl VersionClock {
    /// Creates a clock that has not issued or observed anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a version strictly greater than every version issued or
    /// observed so far.
    pub fn tick(&self) -> Version {
        let wall = Version::from_parts(now_millis(), 0).0;
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            let next = if wall > current { wall } else { current + 1 };
            match self.last.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Version(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Records a version seen elsewhere so later ticks order after it.
    pub fn observe(&self, version: Version) {
        self.last.fetch_max(version.0, Ordering::AcqRel);
    }

    /// The latest version issued or observed.
    pub fn last(&self) -> Version {
        Version(self.last.load(Ordering::Acquire))
    }
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}
