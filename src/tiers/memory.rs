//! In-process memory tier.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct MemoryEntry {
    data: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
}

impl MemoryEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            created_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

struct Inner {
    entries: LruCache<String, MemoryEntry>,
    usage_bytes: usize,
}

impl Inner {
    fn remove_accounting(&mut self, entry: &MemoryEntry, key: &str) {
        self.usage_bytes = self
            .usage_bytes
            .saturating_sub(entry.data.len() + key.len());
    }
}

/// Bounded LRU + TTL in-process tier.
///
/// Eviction is by access recency (a `get` refreshes the entry), expiry is
/// checked lazily on `get`; [`MemoryTier::sweep_expired`] exists as an
/// optimization for long-idle processes but is not needed for correctness.
/// A single mutex guards the map: this tier is a local hot path and
/// correctness beats throughput here. Nothing survives a restart.
pub struct MemoryTier {
    inner: Mutex<Inner>,
    /// Upper bound applied to incoming TTLs, so a huge persistent-tier TTL
    /// cannot pin large values in memory for hours.
    max_ttl: Option<Duration>,
}

impl MemoryTier {
    pub fn new(max_entries: usize) -> Self {
        Self::with_max_ttl(max_entries, None)
    }

    pub fn with_max_ttl(max_entries: usize, max_ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                usage_bytes: 0,
            }),
            max_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.is_expired() => true,
            Some(entry) => return Some(entry.data.clone()),
            None => return None,
        };
        if expired {
            if let Some(entry) = inner.entries.pop(key) {
                inner.remove_accounting(&entry, key);
            }
        }
        None
    }

    pub fn set(&self, key: &str, data: Vec<u8>, ttl: Duration) {
        let ttl = match self.max_ttl {
            Some(cap) => ttl.min(cap),
            None => ttl,
        };
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let added = data.len() + key.len();
        if let Some((old_key, old)) = inner
            .entries
            .push(key.to_string(), MemoryEntry::new(data, ttl))
        {
            // push returns either the replaced value for this key or the
            // evicted LRU victim; both leave the map.
            inner.remove_accounting(&old, &old_key);
        }
        inner.usage_bytes += added;
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.entries.pop(key) {
            Some(entry) => {
                inner.remove_accounting(&entry, key);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.entries.clear();
        inner.usage_bytes = 0;
    }

    /// Live (non-expired) entry count.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate bytes held (keys + values); used for stats reporting.
    pub fn usage_bytes(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .usage_bytes
    }

    /// Remove every entry whose key starts with `prefix`; returns the
    /// number removed. Used for operation-scoped invalidation.
    pub fn delete_by_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let matching: Vec<String> = inner
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &matching {
            if let Some(entry) = inner.entries.pop(key) {
                inner.remove_accounting(&entry, key);
            }
        }
        matching.len()
    }

    /// Drop expired entries eagerly. Optimization only; `get` already
    /// treats expired entries as absent.
    pub fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if let Some(entry) = inner.entries.pop(key) {
                inner.remove_accounting(&entry, key);
            }
        }
        expired.len()
    }
}
