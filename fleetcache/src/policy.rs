use std::time::Duration;

use bounded_integer::bounded_integer;
use fleetcache_backend::ValueFormat;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

bounded_integer! {
    /// Growth factor of a backoff schedule (1-16).
    /// A value of 1 polls at a constant interval.
    #[repr(u8)]
    pub struct BackoffMultiplier { 1..=16 }
}

fn default_multiplier() -> BackoffMultiplier {
    BackoffMultiplier::new(2).unwrap_or(BackoffMultiplier::MIN)
}

/// Bounded exponential backoff used while polling the shared store.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay (e.g., "25ms").
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    /// Largest delay (e.g., "1s").
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Factor applied to the delay after every attempt.
    pub multiplier: BackoffMultiplier,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(25),
            max: Duration::from_secs(1),
            multiplier: default_multiplier(),
        }
    }
}

impl BackoffConfig {
    /// Starts a fresh delay schedule.
    pub fn schedule(&self) -> Backoff {
        Backoff {
            next: self.initial.min(self.max),
            max: self.max,
            multiplier: u32::from(self.multiplier.get()),
        }
    }
}

/// Delay schedule produced by [`BackoffConfig::schedule`].
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current.saturating_mul(self.multiplier).min(self.max);
        Some(current)
    }
}

/// Roughly thirty years: the stand-in for an unbounded wait.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + within`, saturating to a far-future instant instead of
/// overflowing on configured durations such as `"1000years"`.
pub(crate) fn deadline(start: Instant, within: Duration) -> Instant {
    start
        .checked_add(within)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Memoizer policy.
///
/// The defaults suit computations that finish well within a minute:
/// the lock outlives the computation and waiters give up after the same
/// minute, so a crashed computer delays its peers by at most `lock_ttl`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct MemoizeConfig {
    /// Lifetime of a computation lock. Must exceed the worst-case
    /// computation time, otherwise a second process may compute.
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,
    /// How long to retry lock acquisition before switching to waiting.
    #[serde(with = "humantime_serde")]
    pub lock_wait: Duration,
    /// How long a waiter polls for the record before failing.
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Duration,
    /// Poll schedule for lock retries and record polling.
    pub backoff: BackoffConfig,
    /// Encoding of memoization records.
    pub format: ValueFormat,
}

impl Default for MemoizeConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(60),
            lock_wait: Duration::ZERO,
            wait_timeout: Duration::from_secs(60),
            backoff: BackoffConfig::default(),
            format: ValueFormat::default(),
        }
    }
}

impl MemoizeConfig {
    /// Sets the lock lifetime.
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Sets the lock acquisition wait.
    pub fn lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Sets the waiting timeout.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Sets the poll schedule.
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the record encoding.
    pub fn format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }
}
