//! Cache storage capability and the in-memory implementation.
//!
//! Entries carry tags; a tag index (`tag -> keys`) lives beside the LRU so a
//! flush touches only the keys of that tag. Evicted, expired and overwritten
//! entries are removed from the index in the same critical section.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use thiserror::Error;

use super::config::CacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheBackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache entry is corrupt: {0}")]
    Corrupt(String),
}

/// Key/value storage with tag-based bulk invalidation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheBackendError>;

    /// Store `value` under `key`; `ttl = None` keeps it until evicted.
    async fn set(
        &self,
        key: &str,
        value: Bytes,
        tags: &[String],
        ttl: Option<Duration>,
    ) -> Result<(), CacheBackendError>;

    /// Drop every entry carrying `tag`; returns how many were removed.
    async fn flush_by_tag(&self, tag: &str) -> Result<usize, CacheBackendError>;

    /// Whether a live entry carries `tag`.
    async fn has_tag(&self, tag: &str) -> Result<bool, CacheBackendError>;
}

struct Entry {
    value: Bytes,
    tags: Vec<String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Inner {
    entries: LruCache<String, Entry>,
    tags: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.unindex(key, &entry.tags);
                true
            }
            None => false,
        }
    }

    fn unindex(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }
}

/// Process-local [`CacheBackend`] with LRU capacity and per-entry TTL.
pub struct MemoryCacheStore {
    inner: Mutex<Inner>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(config.capacity_non_zero()),
                tags: HashMap::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<Bytes> {
        let mut inner = mutex_lock(&self.inner, SOURCE, "get");
        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.remove(key);
        }
        None
    }

    pub(crate) fn set_at(
        &self,
        key: &str,
        value: Bytes,
        tags: &[String],
        ttl: Option<Duration>,
        now: Instant,
    ) {
        let mut inner = mutex_lock(&self.inner, SOURCE, "set");
        inner.remove(key);

        let mut unique_tags: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique_tags.contains(tag) {
                unique_tags.push(tag.clone());
            }
        }
        for tag in &unique_tags {
            inner
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }

        let entry = Entry {
            value,
            tags: unique_tags,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        };
        if let Some((evicted_key, evicted)) = inner.entries.push(key.to_string(), entry) {
            inner.unindex(&evicted_key, &evicted.tags);
        }
    }

    pub(crate) fn flush_tag(&self, tag: &str) -> usize {
        let mut inner = mutex_lock(&self.inner, SOURCE, "flush_by_tag");
        let Some(keys) = inner.tags.remove(tag) else {
            return 0;
        };
        keys.iter().filter(|key| inner.remove(key)).count()
    }

    pub(crate) fn has_tag_at(&self, tag: &str, now: Instant) -> bool {
        let mut inner = mutex_lock(&self.inner, SOURCE, "has_tag");
        let keys: Vec<String> = match inner.tags.get(tag) {
            Some(keys) => keys.iter().cloned().collect(),
            None => return false,
        };

        let mut alive = false;
        for key in keys {
            match inner.entries.peek(&key).map(|entry| entry.is_expired(now)) {
                Some(false) => alive = true,
                Some(true) => {
                    inner.remove(&key);
                }
                None => inner.unindex(&key, &[tag.to_string()]),
            }
        }
        alive
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheBackendError> {
        Ok(self.get_at(key, Instant::now()))
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        tags: &[String],
        ttl: Option<Duration>,
    ) -> Result<(), CacheBackendError> {
        self.set_at(key, value, tags, ttl, Instant::now());
        Ok(())
    }

    async fn flush_by_tag(&self, tag: &str) -> Result<usize, CacheBackendError> {
        Ok(self.flush_tag(tag))
    }

    async fn has_tag(&self, tag: &str) -> Result<bool, CacheBackendError> {
        Ok(self.has_tag_at(tag, Instant::now()))
    }
}
