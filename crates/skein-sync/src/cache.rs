use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Key/value cache capability handed to the engine.
pub trait ResultCache: Send + Sync {
    /// A live (unexpired) value for `key`.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn put(&self, key: &str, value: Vec<u8>, ttl: Duration);
}

/// One cached value and its absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub expires_at_ms: i64,
}

impl CacheEntry {
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            value,
            expires_at_ms: now_ms().saturating_add(ttl_ms),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at_ms <= now_ms()
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// In-memory, HashMap-based cache.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously exported entries.
    pub fn from_entries(entries: HashMap<String, CacheEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn entries(&self) -> HashMap<String, CacheEntry> {
        self.entries.read().expect("lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn clean(&self) -> usize {
        let mut entries = self.entries.write().expect("lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }
}

impl ResultCache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().expect("lock poisoned");
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(key.to_owned(), CacheEntry::new(value, ttl));
    }
}
