//! Fingerprint-keyed caches

use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::Deserialize;

use super::fingerprint::Fingerprint;

/// Cache sizing
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries kept per cache before the oldest is evicted
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl CacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// At most one artifact per fingerprint
pub trait Cache<T>: Send + Sync {
    fn has(&self, key: &Fingerprint) -> bool;
    fn get(&self, key: &Fingerprint) -> Option<T>;
    /// Store `value`, remembering which source file it came from
    fn set(&self, key: Fingerprint, value: T, file_id: Option<&str>);
    /// Drop every entry recorded against `file_id`; returns how many
    fn purge(&self, file_id: &str) -> usize;
}

struct Entry<T> {
    value: T,
    file_id: Option<String>,
}

/// Bounded in-memory cache; the oldest insertion is evicted first
pub struct MemoryCache<T> {
    capacity: usize,
    entries: Mutex<IndexMap<Fingerprint, Entry<T>>>,
}

impl<T> MemoryCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<Fingerprint, Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl<T: Clone + Send> Cache<T> for MemoryCache<T> {
    fn has(&self, key: &Fingerprint) -> bool {
        self.lock().contains_key(key)
    }

    fn get(&self, key: &Fingerprint) -> Option<T> {
        self.lock().get(key).map(|entry| entry.value.clone())
    }

    fn set(&self, key: Fingerprint, value: T, file_id: Option<&str>) {
        let mut entries = self.lock();
        entries.shift_remove(&key);
        while entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(
            key,
            Entry {
                value,
                file_id: file_id.map(str::to_string),
            },
        );
    }

    fn purge(&self, file_id: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.file_id.as_deref() != Some(file_id));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> Fingerprint {
        Fingerprint::new("test", [name])
    }

    #[test]
    fn test_set_get_has() {
        let cache = MemoryCache::new(4);
        assert!(!cache.has(&key("a")));
        cache.set(key("a"), 1, None);
        assert!(cache.has(&key("a")));
        assert_eq!(cache.get(&key("a")), Some(1));
        assert_eq!(cache.get(&key("b")), None);
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let cache = MemoryCache::new(2);
        cache.set(key("a"), 1, None);
        cache.set(key("b"), 2, None);
        cache.set(key("c"), 3, None);
        assert_eq!(cache.len(), 2);
        assert!(!cache.has(&key("a")));
        assert!(cache.has(&key("c")));
    }

    #[test]
    fn test_one_entry_per_fingerprint() {
        let cache = MemoryCache::new(2);
        cache.set(key("a"), 1, None);
        cache.set(key("a"), 2, None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("a")), Some(2));
    }

    #[test]
    fn test_purge_by_file() {
        let cache = MemoryCache::new(8);
        cache.set(key("a"), 1, Some("page.html"));
        cache.set(key("b"), 2, Some("other.html"));
        cache.set(key("c"), 3, Some("page.html"));
        assert_eq!(cache.purge("page.html"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.has(&key("b")));
    }
}
