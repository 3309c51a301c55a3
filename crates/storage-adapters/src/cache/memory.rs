//! Process-local cache on a concurrent hash map. Entries expire lazily on
//! read, and in bulk through [`MemoryCache::purge_expired`], which also runs
//! after every `purge_every` writes so keys that are never read again do not
//! pile up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use domains::{CacheBackend, CacheError};

struct Entry {
    payload: Bytes,
    expires_at: Instant,
}

const DEFAULT_PURGE_EVERY: usize = 1024;

pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    prefix_deletes: bool,
    purge_every: usize,
    writes: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            prefix_deletes: true,
            purge_every: DEFAULT_PURGE_EVERY,
            writes: AtomicUsize::new(0),
        }
    }

    /// A cache that only supports exact-key deletes, like a plain memcached.
    /// Prefix invalidation fails and stale entries live until their TTL.
    pub fn exact_only() -> Self {
        Self {
            prefix_deletes: false,
            ..Self::new()
        }
    }

    /// Sweeps expired entries after every `writes` puts. Zero disables the
    /// write-triggered sweep.
    pub fn with_purge_every(mut self, writes: usize) -> Self {
        self.purge_every = writes;
        self
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        if self.prefix_deletes {
            "memory"
        } else {
            "memory-exact"
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.payload.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn put(&self, key: &str, payload: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
        if self.purge_every > 0 {
            let written = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
            if written % self.purge_every == 0 {
                let purged = self.purge_expired();
                if purged > 0 {
                    debug!(purged, "expired cache entries dropped");
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        if !self.prefix_deletes {
            return Err(CacheError::PatternUnsupported);
        }
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}
