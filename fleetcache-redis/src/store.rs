//! Redis shared store implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fleetcache_backend::{BackendResult, DeleteStatus, LockStatus, SharedStore};
use fleetcache_core::Raw;
use redis::Script;
use smol_str::SmolStr;
use tracing::trace;

use crate::bus::RedisBus;
use crate::connection::LazyConnection;
use crate::error::Error;

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Keys requested per `SCAN` round trip.
const SCAN_COUNT: usize = 100;

/// Redis shared store based on the redis-rs crate.
///
/// Values are stored as plain strings. TTLs are passed to Redis in
/// milliseconds, so expiry is enforced by the server for every process
/// at once.
///
/// # Examples
///
/// ```no_run
/// use fleetcache_redis::RedisStore;
///
/// let store = RedisStore::builder()
///     .server("redis://127.0.0.1/")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RedisStore {
    connection: LazyConnection,
    compare_and_delete: Script,
    name: SmolStr,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("name", &self.name).finish()
    }
}

impl RedisStore {
    /// Creates a store for the local default server.
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    /// Creates new RedisStore builder with default settings.
    #[must_use]
    pub fn builder() -> RedisStoreBuilder {
        RedisStoreBuilder::default()
    }

    /// A pub/sub bus on the same server, sharing this store's connection
    /// for publishing.
    pub fn bus(&self) -> RedisBus {
        RedisBus::from_connection(self.connection.clone())
    }
}

/// Part of builder pattern implementation for RedisStore.
pub struct RedisStoreBuilder {
    connection_info: String,
    name: SmolStr,
}

impl Default for RedisStoreBuilder {
    fn default() -> Self {
        Self {
            connection_info: "redis://127.0.0.1/".to_owned(),
            name: SmolStr::new_static("redis"),
        }
    }
}

impl RedisStoreBuilder {
    /// Set connection info (host, port, database, etc.) for RedisStore.
    pub fn server(mut self, connection_info: impl Into<String>) -> Self {
        self.connection_info = connection_info.into();
        self
    }

    /// Set a custom name for this store, used in logs.
    pub fn name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = name.into();
        self
    }

    /// Create new instance of Redis store with passed settings.
    ///
    /// Only the URL is validated here; no connection is made.
    pub fn build(self) -> Result<RedisStore, Error> {
        Ok(RedisStore {
            connection: LazyConnection::open(&self.connection_info)?,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            name: self.name,
        })
    }
}

/// Escapes glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('*');
    escaped
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis.
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn delete_status(deleted: u64) -> DeleteStatus {
    if deleted > 0 {
        DeleteStatus::Deleted(u32::try_from(deleted).unwrap_or(u32::MAX))
    } else {
        DeleteStatus::Missing
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> BackendResult<Option<Raw>> {
        let mut con = self.connection.manager().await?;
        let data: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(data.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Raw, ttl: Option<Duration>) -> BackendResult<()> {
        let mut con = self.connection.manager().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value.as_ref());
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        cmd.query_async::<()>(&mut con)
            .await
            .map_err(Error::from)?;
        trace!(key, ?ttl, "redis set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<DeleteStatus> {
        let mut con = self.connection.manager().await?;
        let deleted: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(delete_status(deleted))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Raw,
        ttl: Duration,
    ) -> BackendResult<LockStatus> {
        let mut con = self.connection.manager().await?;
        // Nil reply means the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        let status = match reply {
            Some(_) => LockStatus::Acquired,
            None => LockStatus::Locked,
        };
        trace!(key, ?status, "redis set_if_absent");
        Ok(status)
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> BackendResult<DeleteStatus> {
        let mut con = self.connection.manager().await?;
        let deleted: u64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(delete_status(deleted))
    }

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<DeleteStatus> {
        let mut con = self.connection.manager().await?;
        let pattern = glob_escape(prefix);
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut con)
                .await
                .map_err(Error::from)?;
            if !keys.is_empty() {
                let removed: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut con)
                    .await
                    .map_err(Error::from)?;
                deleted += removed;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        trace!(prefix, deleted, "redis delete_prefix");
        Ok(delete_status(deleted))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
