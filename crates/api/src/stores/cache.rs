//! In-process key-value cache with TTL expiry and tag-based invalidation.
//!
//! A best-effort read-through accelerator, never a source of truth: every
//! operation is infallible and callers must be able to recompute a value
//! from the authoritative store on a miss. Expiry is two-pronged: lazy
//! eviction on read plus a periodic [`MemoryCache::cleanup`] sweep (spawned
//! at startup) so write-heavy, read-never keys do not grow memory
//! unboundedly.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

struct CacheEntry {
    data: Value,
    expires_at: DateTime<Utc>,
    tags: Vec<String>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Diagnostic snapshot. `expired` counts entries past their expiry that
/// have not yet been evicted by a read or a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub tags: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tag_index: HashMap<String, HashSet<String>>,
}

impl CacheInner {
    /// Removes an entry, deregistering it from the tag index. Empty tag
    /// sets are pruned immediately so the index never lists dead tags.
    fn remove(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };

        for tag in &entry.tags {
            if let Some(members) = self.tag_index.get_mut(tag) {
                members.remove(key);
                if members.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }

        true
    }
}

/// Process-wide cache instance, constructed at startup and handed to
/// request handlers through `AppState` so tests can build their own.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<CacheInner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value if present and unexpired. An expired entry
    /// is evicted on the way out and reported as absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        match inner.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.remove(key);
                None
            }
            Some(entry) => Some(entry.data.clone()),
            None => None,
        }
    }

    /// Stores a value expiring `ttl_secs` from now, replacing any existing
    /// entry at `key` and re-registering its tags. A non-positive TTL is
    /// permitted and yields an entry that is already expired.
    pub fn set(&self, key: &str, data: Value, ttl_secs: i64, tags: &[&str]) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        // Drop the old entry first so stale tag registrations do not linger.
        inner.remove(key);

        for tag in tags {
            inner
                .tag_index
                .entry((*tag).to_string())
                .or_default()
                .insert(key.to_string());
        }

        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                expires_at: Utc::now() + Duration::seconds(ttl_secs),
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
            },
        );
    }

    /// Removes the entry if present; returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(key)
    }

    /// Deletes every key currently registered under `tag`; returns the
    /// number of entries removed. An absent tag yields 0.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let Some(members) = inner.tag_index.remove(tag) else {
            return 0;
        };

        let mut deleted = 0;
        for key in members {
            if inner.remove(&key) {
                deleted += 1;
            }
        }

        deleted
    }

    /// Evicts all entries past their expiry; returns the number removed.
    pub fn cleanup(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            inner.remove(&key);
        }

        count
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        let expired = inner
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .count();

        CacheStats {
            total: inner.entries.len(),
            active: inner.entries.len() - expired,
            expired,
            tags: inner.tag_index.len(),
        }
    }

    /// Read-through helper: returns the cached value for `key`, or runs
    /// `fetcher`, stores its result, and returns it. A cached value that no
    /// longer deserializes as `T` is treated as a miss.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: i64,
        tags: &[&str],
        fetcher: F,
    ) -> Result<T>
    where
        T: Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get(key) {
            if let Ok(value) = serde_json::from_value(cached) {
                return Ok(value);
            }
        }

        let value = fetcher().await?;
        self.set(key, serde_json::to_value(&value)?, ttl_secs, tags);

        Ok(value)
    }
}
