//! Store key and channel name derivation.
//!
//! All processes of a fleet derive keys the same way, so the derivation must
//! be deterministic and injective: two different `(namespace, key)` pairs
//! never land on the same store key, and the store keys of different
//! [`KeyKind`]s never collide.
//!
//! ## Format
//!
//! ```text
//! {prefix}:cache:{namespace}:{key}     cached value
//! {prefix}:memo:{name}                 memoization record
//! {prefix}:lock:{name}                 memoization lock
//! {prefix}:invalidate:{namespace}      pub/sub channel
//! ```
//!
//! Every variable segment is escaped: `:` `%` and the glob metacharacters
//! `*` `?` `[` `]` `\` are percent-encoded. Escaped segments contain no `:`,
//! so the prefix `{prefix}:cache:{namespace}:` matches exactly the keys of
//! one namespace and is safe to use as a `SCAN MATCH` pattern.
//!
//! ```
//! use fleetcache_core::{KeyCodec, Namespace};
//!
//! let codec = KeyCodec::default();
//! let ns = Namespace::new("site_settings").unwrap();
//!
//! assert_eq!(codec.cache_key(&ns, "title"), "fleetcache:cache:site_settings:title");
//! assert_eq!(codec.cache_key(&ns, "a:b"), "fleetcache:cache:site_settings:a%3Ab");
//! assert_eq!(codec.memo_key("hello"), "fleetcache:memo:hello");
//! assert_eq!(codec.lock_key("hello"), "fleetcache:lock:hello");
//! assert_eq!(codec.channel(&ns), "fleetcache:invalidate:site_settings");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Default prefix of every key produced by [`KeyCodec::default`].
pub const DEFAULT_PREFIX: &str = "fleetcache";

/// Errors raised while validating namespaces and key prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Namespace was empty or whitespace only.
    #[error("namespace must not be empty")]
    EmptyNamespace,
    /// Key prefix was empty or whitespace only.
    #[error("key prefix must not be empty")]
    EmptyPrefix,
}

/// A validated namespace scoping all keys of one cache instance.
///
/// Namespaces are compared verbatim; escaping only happens when a store key
/// or channel is derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(SmolStr);

impl Namespace {
    /// Creates a namespace, rejecting empty or whitespace-only names.
    pub fn new(name: impl Into<SmolStr>) -> Result<Self, KeyError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KeyError::EmptyNamespace);
        }
        Ok(Self(name))
    }

    /// Returns the namespace as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for Namespace {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Namespace::new(value)
    }
}

impl TryFrom<&str> for Namespace {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Namespace::new(value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.0.to_string()
    }
}

/// What a derived store key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// A distributed cache entry.
    Cache,
    /// A memoization record.
    Memo,
    /// A memoization lock.
    Lock,
}

impl KeyKind {
    /// Segment used for this kind in derived keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Cache => "cache",
            KeyKind::Memo => "memo",
            KeyKind::Lock => "lock",
        }
    }
}

/// Derives store keys and channel names from logical names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCodec {
    prefix: SmolStr,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self {
            prefix: SmolStr::new_static(DEFAULT_PREFIX),
        }
    }
}

impl KeyCodec {
    /// Creates a codec with a custom prefix.
    ///
    /// Different prefixes partition one store between unrelated fleets.
    pub fn new(prefix: impl AsRef<str>) -> Result<Self, KeyError> {
        let prefix = prefix.as_ref();
        if prefix.trim().is_empty() {
            return Err(KeyError::EmptyPrefix);
        }
        Ok(Self {
            prefix: SmolStr::from(escape(prefix)),
        })
    }

    /// Returns the (escaped) prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Store key of a distributed cache entry.
    pub fn cache_key(&self, namespace: &Namespace, key: &str) -> String {
        let mut out = self.cache_prefix(namespace);
        push_escaped(&mut out, key);
        out
    }

    /// Common prefix of every store key in `namespace`, trailing separator
    /// included.
    pub fn cache_prefix(&self, namespace: &Namespace) -> String {
        let mut out = self.kind_prefix(KeyKind::Cache);
        push_escaped(&mut out, namespace.as_str());
        out.push(':');
        out
    }

    /// Store key of the memoization record for `name`.
    pub fn memo_key(&self, name: &str) -> String {
        self.named(KeyKind::Memo, name)
    }

    /// Store key of the memoization lock for `name`.
    pub fn lock_key(&self, name: &str) -> String {
        self.named(KeyKind::Lock, name)
    }

    /// Pub/sub channel carrying invalidations for `namespace`.
    pub fn channel(&self, namespace: &Namespace) -> String {
        let mut out = String::with_capacity(self.prefix.len() + namespace.as_str().len() + 12);
        out.push_str(&self.prefix);
        out.push_str(":invalidate:");
        push_escaped(&mut out, namespace.as_str());
        out
    }

    fn named(&self, kind: KeyKind, name: &str) -> String {
        let mut out = self.kind_prefix(kind);
        push_escaped(&mut out, name);
        out
    }

    fn kind_prefix(&self, kind: KeyKind) -> String {
        let kind = kind.as_str();
        let mut out = String::with_capacity(self.prefix.len() + kind.len() + 2);
        out.push_str(&self.prefix);
        out.push(':');
        out.push_str(kind);
        out.push(':');
        out
    }
}

fn needs_escape(c: char) -> bool {
    matches!(c, ':' | '%' | '*' | '?' | '[' | ']' | '\\')
}

fn push_escaped(out: &mut String, segment: &str) {
    for c in segment.chars() {
        if needs_escape(c) {
            // All escaped characters are ASCII.
            out.push('%');
            out.push_str(&format!("{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
}

fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    push_escaped(&mut out, segment);
    out
}
