//! Process-local mirror of one cache namespace.
//!
//! Races between reads, local writes and peer invalidations are settled by
//! local event order, not by comparing versions: versions come from clocks
//! on different hosts and do not say in which order the shared store
//! applied two writes. Every slot carries a generation drawn from a
//! mirror-wide counter. A store read takes a [`Ticket`] before it starts
//! and may only populate the slot if the generation is unchanged when it
//! returns; a local write does the same around its store round trip. A peer
//! invalidation removes the slot, which voids every outstanding ticket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fleetcache_core::Version;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    version: Version,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

struct Slot<V> {
    entry: Option<CacheEntry<V>>,
    generation: u64,
}

/// Proof that a read or write started at a given point of a slot's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Concurrent map of logical key to cached value and version.
pub struct LocalMirror<V> {
    slots: DashMap<String, Slot<V>>,
    generations: AtomicU64,
    ttl: Option<Duration>,
}

impl<V> std::fmt::Debug for LocalMirror<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMirror")
            .field("slots", &self.slots.len())
            .field("generation", &self.generations.load(Ordering::Relaxed))
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<V> LocalMirror<V>
where
    V: Clone,
{
    /// Creates an empty mirror whose entries live for `ttl`.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            slots: DashMap::new(),
            generations: AtomicU64::new(1),
            ttl,
        }
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    fn entry(&self, value: V, version: Version) -> CacheEntry<V> {
        let now = Instant::now();
        CacheEntry {
            value,
            version,
            // A TTL too large to represent never expires.
            expires_at: self.ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    /// Cached value of `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let slot = self.slots.get(key)?;
        let entry = slot.entry.as_ref()?;
        entry.is_live(Instant::now()).then(|| entry.value.clone())
    }

    /// Whether `key` has a live entry.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Version of the cached entry of `key`.
    pub fn version(&self, key: &str) -> Option<Version> {
        self.slots
            .get(key)
            .and_then(|slot| slot.entry.as_ref().map(|entry| entry.version))
    }

    /// Stores a value unconditionally, voiding outstanding tickets.
    pub fn insert(&self, key: &str, value: V, version: Version) {
        let slot = Slot {
            entry: Some(self.entry(value, version)),
            generation: self.next_generation(),
        };
        self.slots.insert(key.to_owned(), slot);
    }

    /// Ticket for a shared store read of `key` that is about to start.
    pub fn read_ticket(&self, key: &str) -> Ticket {
        let slot = self.slots.entry(key.to_owned()).or_insert_with(|| Slot {
            entry: None,
            generation: self.next_generation(),
        });
        Ticket(slot.generation)
    }

    /// Admits a value read from the shared store under `ticket`.
    ///
    /// Refused when anything touched the slot since the ticket was taken:
    /// a local write, a peer invalidation or a reset. Returns whether the
    /// value was stored.
    pub fn populate(&self, key: &str, value: V, version: Version, ticket: Ticket) -> bool {
        match self.slots.get_mut(key) {
            Some(mut slot) if slot.generation == ticket.0 => {
                slot.entry = Some(self.entry(value, version));
                true
            }
            _ => false,
        }
    }

    /// Releases the slot created for a read that found nothing to cache.
    pub fn discard(&self, key: &str, ticket: Ticket) {
        self.slots
            .remove_if(key, |_, slot| slot.generation == ticket.0 && slot.entry.is_none());
    }

    /// Marks a local write of `key` as in flight.
    ///
    /// The current entry is evicted immediately, so a write abandoned
    /// halfway leaves no possibly stale value behind.
    pub fn begin_write(&self, key: &str) -> Ticket {
        let generation = self.next_generation();
        self.slots.insert(
            key.to_owned(),
            Slot {
                entry: None,
                generation,
            },
        );
        Ticket(generation)
    }

    /// Completes a local write started with [`begin_write`](Self::begin_write).
    ///
    /// `written` is cached only when nothing else touched the slot during
    /// the write. Otherwise the store order of the overlapping operations is
    /// unknown, and the slot is dropped so the next read goes to the store.
    /// Returns whether the value was cached.
    pub fn finish_write(&self, key: &str, ticket: Ticket, written: Option<(V, Version)>) -> bool {
        let Entry::Occupied(mut occupied) = self.slots.entry(key.to_owned()) else {
            return false;
        };
        if occupied.get().generation != ticket.0 {
            occupied.remove();
            return false;
        }
        match written {
            Some((value, version)) => {
                let entry = self.entry(value, version);
                let generation = self.next_generation();
                let slot = occupied.get_mut();
                slot.entry = Some(entry);
                slot.generation = generation;
                true
            }
            None => {
                occupied.remove();
                false
            }
        }
    }

    /// Applies an invalidation of `key`.
    ///
    /// Always evicts: the entry may hold a value the store has since
    /// overwritten, whatever the versions say. Returns whether a live entry
    /// was evicted.
    pub fn invalidate(&self, key: &str) -> bool {
        let now = Instant::now();
        self.slots
            .remove(key)
            .and_then(|(_, slot)| slot.entry)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Drops every entry and voids every outstanding ticket, returning how
    /// many live entries were evicted.
    pub fn invalidate_all(&self) -> usize {
        let evicted = self.len();
        self.slots.clear();
        evicted
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots
            .iter()
            .filter(|slot| slot.entry.as_ref().is_some_and(|entry| entry.is_live(now)))
            .count()
    }

    /// Whether no live entry is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
