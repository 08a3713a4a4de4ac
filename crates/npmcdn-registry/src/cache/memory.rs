//! Bounded in-process cache backend

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{namespaced, CacheBackend, CachedInfo};
use crate::RegistryResult;

/// Default maximum number of entries
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: CachedInfo,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory cache bounded by entry count. When full, the entry closest to
/// expiry makes room for the new one.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: DashMap<String, MemoryEntry>,
    capacity: usize,
}

impl MemoryBackend {
    /// Create a backend with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a backend holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of stored entries, including ones that have expired but were not read since
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.is_fresh(now) {
                true
            } else {
                removed += 1;
                false
            }
        });
        removed
    }

    fn evict_one(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> RegistryResult<Option<CachedInfo>> {
        let key = namespaced(key);
        let now = Instant::now();

        match self.entries.get(&key) {
            Some(entry) if entry.is_fresh(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        // Stale: the read guard is released before removing
        self.entries.remove(&key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: CachedInfo, ttl: Duration) -> RegistryResult<()> {
        let key = namespaced(key);

        if !self.entries.contains_key(&key) && self.len() >= self.capacity {
            self.cleanup();
            if self.len() >= self.capacity {
                self.evict_one();
            }
        }

        self.entries.insert(
            key,
            MemoryEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> RegistryResult<()> {
        self.entries.remove(&namespaced(key));
        Ok(())
    }
}
