//! In-process cache backend.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheStore, Result};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Cache store backed by a concurrent in-process map.
///
/// Expired entries are dropped lazily on access; writes on a shared key are
/// last-write-wins, which is exactly the mirror semantics the session layer
/// relies on.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a live entry, removing it if it has expired.
    fn live(&self, key: &str) -> Option<Entry> {
        let entry = self.entries.get(key)?.clone();
        if entry.is_expired() {
            // remove_if re-checks under the shard lock so a concurrent
            // overwrite with a fresh TTL is not lost
            self.entries.remove_if(key, |_, e| e.is_expired());
            return None;
        }
        Some(entry)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live(key).and_then(|entry| match entry.value {
            Value::Text(text) => Some(text),
            Value::Set(_) => None,
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.entries.remove(key) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> Result<()> {
        let mut set = match self.live(key) {
            Some(Entry {
                value: Value::Set(existing),
                ..
            }) => existing,
            _ => HashSet::new(),
        };
        set.extend(members.iter().cloned());

        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Set(set),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(match self.live(key) {
            Some(Entry {
                value: Value::Set(set), ..
            }) => set.into_iter().collect(),
            _ => Vec::new(),
        })
    }

    async fn close(&self) {
        self.entries.clear();
    }
}
