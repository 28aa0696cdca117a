//! Key-value cache store with per-entry TTLs and set semantics.
//!
//! The cache holds captcha challenges, the per-user SSO token mirror, the
//! logout blacklist and the per-user permission sets (see [`keys`] for the
//! key namespaces). It is modeled as an injected handle with an explicit
//! [`connect`]/[`CacheStore::close`] lifecycle rather than ambient global
//! state; [`MemoryCache`] is the in-process backend and the trait seam
//! admits a networked store without touching the callers.

pub mod keys;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;

/// Failure talking to the cache store.
///
/// The in-process backend is infallible, but the trait allows for backends
/// where every call crosses the network.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Operations the core needs from its cache store.
///
/// Writes carry their TTL; an expired entry is indistinguishable from an
/// absent one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a string value. Absent or expired keys yield `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value, replacing any existing entry and its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove a key. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Add members to a set, creating it if absent, and (re)set its TTL.
    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> Result<()>;

    /// Read all members of a set. Absent or expired keys yield an empty vec.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Release any resources held by the store.
    async fn close(&self);
}

/// Shared handle to the process-wide cache store.
pub type Cache = Arc<dyn CacheStore>;

/// Connect the in-process cache backend.
pub fn connect() -> Cache {
    Arc::new(MemoryCache::new())
}
