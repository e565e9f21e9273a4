//! Invalidation messages exchanged over the pub/sub bus.

use serde::{Deserialize, Serialize};

use crate::key::Namespace;
use crate::label::ProcessId;
use crate::version::Version;

/// Which entries an invalidation targets.
///
/// Tagged on the wire (`{"key": "..."}` or `"all"`), so a logical key
/// spelled `*` is still a single key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationTarget {
    /// A single logical key.
    Key(String),
    /// Every key of the namespace.
    All,
}

/// Tells every process that entries of a namespace changed.
///
/// The producer has already applied the change to its own mirror, so
/// receivers drop messages whose `origin` is themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    /// Namespace of the cache that changed.
    pub namespace: Namespace,
    /// Affected entries.
    pub target: InvalidationTarget,
    /// Version of the write.
    pub version: Version,
    /// Instance that produced the write.
    pub origin: ProcessId,
}

impl InvalidationMessage {
    /// Invalidation of one key.
    pub fn key(
        namespace: Namespace,
        key: impl Into<String>,
        version: Version,
        origin: ProcessId,
    ) -> Self {
        Self {
            namespace,
            target: InvalidationTarget::Key(key.into()),
            version,
            origin,
        }
    }

    /// Invalidation of the whole namespace.
    pub fn all(namespace: Namespace, version: Version, origin: ProcessId) -> Self {
        Self {
            namespace,
            target: InvalidationTarget::All,
            version,
            origin,
        }
    }

    /// Whether this message was produced by `process`.
    pub fn is_from(&self, process: &ProcessId) -> bool {
        &self.origin == process
    }
}
