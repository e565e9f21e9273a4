//! Metrics declaration and initialization.
//!
//! Names are registered lazily on first use. Recording happens inline at
//! the call sites behind `#[cfg(feature = "metrics")]`, so a build without
//! the feature carries no metrics code at all.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Local mirror

    /// Track number of reads served by the local mirror.
    pub static ref MIRROR_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fleetcache_mirror_hit_total",
            "Total number of reads served by the local mirror."
        );
        "fleetcache_mirror_hit_total"
    };
    /// Track number of reads that had to go to the shared store.
    pub static ref MIRROR_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fleetcache_mirror_miss_total",
            "Total number of reads that missed the local mirror."
        );
        "fleetcache_mirror_miss_total"
    };
    /// Track number of store reads absorbed as misses.
    pub static ref STORE_READ_ERRORS: &'static str = {
        metrics::describe_counter!(
            "fleetcache_store_read_errors_total",
            "Total number of failed shared store reads treated as misses."
        );
        "fleetcache_store_read_errors_total"
    };

    // Invalidation

    /// Track number of invalidation messages published.
    pub static ref INVALIDATIONS_PUBLISHED: &'static str = {
        metrics::describe_counter!(
            "fleetcache_invalidations_published_total",
            "Total number of invalidation messages published."
        );
        "fleetcache_invalidations_published_total"
    };
    /// Track number of invalidation messages applied to the mirror.
    pub static ref INVALIDATIONS_APPLIED: &'static str = {
        metrics::describe_counter!(
            "fleetcache_invalidations_applied_total",
            "Total number of invalidation messages applied to the local mirror."
        );
        "fleetcache_invalidations_applied_total"
    };
    /// Track number of invalidation messages skipped.
    pub static ref INVALIDATIONS_IGNORED: &'static str = {
        metrics::describe_counter!(
            "fleetcache_invalidations_ignored_total",
            "Total number of invalidation messages skipped (own echo, foreign namespace, malformed)."
        );
        "fleetcache_invalidations_ignored_total"
    };
    /// Track number of listener resubscriptions.
    pub static ref LISTENER_RESUBSCRIBED: &'static str = {
        metrics::describe_counter!(
            "fleetcache_listener_resubscribed_total",
            "Total number of invalidation listener resubscriptions."
        );
        "fleetcache_listener_resubscribed_total"
    };

    // Memoizer

    /// Track number of memoized computations run.
    pub static ref MEMOIZE_COMPUTED: &'static str = {
        metrics::describe_counter!(
            "fleetcache_memoize_computed_total",
            "Total number of memoized computations run by this process."
        );
        "fleetcache_memoize_computed_total"
    };
    /// Track number of memoize calls answered by an existing record.
    pub static ref MEMOIZE_HIT: &'static str = {
        metrics::describe_counter!(
            "fleetcache_memoize_hit_total",
            "Total number of memoize calls answered by a stored record."
        );
        "fleetcache_memoize_hit_total"
    };
    /// Track number of memoize calls that waited for another process.
    pub static ref MEMOIZE_WAITED: &'static str = {
        metrics::describe_counter!(
            "fleetcache_memoize_waited_total",
            "Total number of memoize calls that waited for another computer."
        );
        "fleetcache_memoize_waited_total"
    };
    /// Track number of memoize waits that timed out.
    pub static ref MEMOIZE_TIMEOUT: &'static str = {
        metrics::describe_counter!(
            "fleetcache_memoize_timeout_total",
            "Total number of memoize waits that timed out."
        );
        "fleetcache_memoize_timeout_total"
    };
    /// Histogram of memoize call duration.
    pub static ref MEMOIZE_DURATION: &'static str = {
        metrics::describe_histogram!(
            "fleetcache_memoize_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of memoize calls in seconds."
        );
        "fleetcache_memoize_duration_seconds"
    };

    // Locks

    /// Track number of locks acquired.
    pub static ref LOCK_ACQUIRED: &'static str = {
        metrics::describe_counter!(
            "fleetcache_lock_acquired_total",
            "Total number of locks acquired."
        );
        "fleetcache_lock_acquired_total"
    };
    /// Track number of acquisition attempts that found the lock held.
    pub static ref LOCK_BUSY: &'static str = {
        metrics::describe_counter!(
            "fleetcache_lock_busy_total",
            "Total number of lock acquisition attempts that found the lock held."
        );
        "fleetcache_lock_busy_total"
    };
}
