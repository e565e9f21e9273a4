//! Simple in-memory test store implementation using DashMap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fleetcache_backend::{
    BackendError, BackendResult, DeleteStatus, LockStatus, SharedStore,
};
use fleetcache_core::Raw;

/// Simple in-memory store for testing using DashMap.
///
/// TTLs are ignored. This store is thread-safe and can be cloned cheaply
/// (Arc internally).
#[derive(Clone, Default)]
pub struct TestStore {
    store: Arc<DashMap<String, Raw>>,
}

impl TestStore {
    /// Create a new empty test store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a key exists in the store.
    pub fn has(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }
}

#[async_trait]
impl SharedStore for TestStore {
    async fn get(&self, key: &str) -> BackendResult<Option<Raw>> {
        Ok(self.store.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Raw, _ttl: Option<Duration>) -> BackendResult<()> {
        self.store.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<DeleteStatus> {
        Ok(match self.store.remove(key) {
            Some(_) => DeleteStatus::Deleted(1),
            None => DeleteStatus::Missing,
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Raw,
        _ttl: Duration,
    ) -> BackendResult<LockStatus> {
        Ok(match self.store.entry(key.to_owned()) {
            Entry::Occupied(_) => LockStatus::Locked,
            Entry::Vacant(entry) => {
                entry.insert(value);
                LockStatus::Acquired
            }
        })
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> BackendResult<DeleteStatus> {
        Ok(
            match self.store.remove_if(key, |_, value| value.as_ref() == expected) {
                Some(_) => DeleteStatus::Deleted(1),
                None => DeleteStatus::Missing,
            },
        )
    }

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<DeleteStatus> {
        let before = self.store.len();
        self.store.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.store.len());
        Ok(if removed > 0 {
            DeleteStatus::Deleted(removed as u32)
        } else {
            DeleteStatus::Missing
        })
    }

    fn name(&self) -> &str {
        "test"
    }
}

/// Store that always returns errors (for error testing).
#[derive(Clone, Default)]
pub struct ErrorStore;

fn simulated() -> BackendError {
    BackendError::ConnectionError(Box::new(std::io::Error::other("simulated error")))
}

#[async_trait]
impl SharedStore for ErrorStore {
    async fn get(&self, _key: &str) -> BackendResult<Option<Raw>> {
        Err(simulated())
    }

    async fn set(&self, _key: &str, _value: Raw, _ttl: Option<Duration>) -> BackendResult<()> {
        Err(simulated())
    }

    async fn delete(&self, _key: &str) -> BackendResult<DeleteStatus> {
        Err(simulated())
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: Raw,
        _ttl: Duration,
    ) -> BackendResult<LockStatus> {
        Err(simulated())
    }

    async fn delete_if_equals(&self, _key: &str, _expected: &[u8]) -> BackendResult<DeleteStatus> {
        Err(simulated())
    }

    async fn delete_prefix(&self, _prefix: &str) -> BackendResult<DeleteStatus> {
        Err(simulated())
    }

    fn name(&self) -> &str {
        "error"
    }
}
