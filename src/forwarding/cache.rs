//! Response cache keyed by target URL.
//!
//! Holds the last successfully forwarded body per URL. Entries expire after
//! a TTL (checked on read) and the map is capped at `max_entries`: expired
//! entries go first, then the oldest stored.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::observability::metrics;

/// A stored upstream body.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: Bytes,
    pub stored_at: Instant,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Thread-safe URL → body cache. Clones share storage.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<DashMap<String, CacheEntry>>,
    counters: Arc<Counters>,
    ttl: Option<Duration>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

enum Lookup {
    Hit(Bytes),
    Expired,
    Missing,
}

impl ResponseCache {
    /// Create a cache on the system clock.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            ttl: (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs)),
            max_entries: config.max_entries.max(1),
            clock,
        }
    }

    /// Fetch the stored body for `key` if present and fresh.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = self.clock.now();
        let lookup = match self.inner.get(key) {
            Some(entry) if self.is_expired(&entry, now) => Lookup::Expired,
            Some(entry) => Lookup::Hit(entry.body.clone()),
            None => Lookup::Missing,
        };

        match lookup {
            Lookup::Hit(body) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(body)
            }
            Lookup::Expired => {
                // Re-check under the shard lock: a fresh put may have landed.
                if self
                    .inner
                    .remove_if(key, |_, entry| self.is_expired(entry, now))
                    .is_some()
                {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_evictions(1);
                    metrics::record_cache_size(self.inner.len());
                }
                tracing::debug!(key, "Cache entry expired");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Missing => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store (or replace) the body for `key`.
    pub fn put(&self, key: &str, body: Bytes) {
        if !self.inner.contains_key(key) && self.inner.len() >= self.max_entries {
            self.make_room();
        }

        let stored_at = self.clock.now();
        self.inner.insert(key.to_string(), CacheEntry { body, stored_at });
        metrics::record_cache_size(self.inner.len());
    }

    /// Full entry including its store time, without touching counters.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    /// Stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of hit, miss, entry and eviction counts.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            entries: self.inner.len(),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Remove every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.inner.retain(|_, entry| {
            if self.is_expired(entry, now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            metrics::record_cache_evictions(removed);
            metrics::record_cache_size(self.inner.len());
        }
        removed
    }

    fn make_room(&self) {
        let expired = self.purge_expired();
        if self.inner.len() < self.max_entries {
            return;
        }

        let oldest = self
            .inner
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if self.inner.remove(&key).is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_evictions(1);
                tracing::info!(
                    key = %key,
                    expired,
                    max_entries = self.max_entries,
                    "Response cache full, evicted oldest entry"
                );
            }
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(entry.stored_at) >= ttl,
            None => false,
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.inner.len())
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(ttl_secs: u64, max_entries: usize) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            ttl_secs,
            max_entries,
        };
        (ResponseCache::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn test_cache_operations() {
        let (cache, _) = cache(300, 16);
        assert!(cache.get("https://a.example/").is_none());

        cache.put("https://a.example/", Bytes::from_static(b"first"));
        assert_eq!(cache.get("https://a.example/").unwrap(), "first");

        cache.put("https://a.example/", Bytes::from_static(b"second"));
        assert_eq!(cache.get("https://a.example/").unwrap(), "second");
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let (cache, clock) = cache(10, 16);
        cache.put("k", Bytes::from_static(b"v"));

        clock.advance(Duration::from_secs(9));
        assert!(cache.get("k").is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let (cache, clock) = cache(0, 16);
        cache.put("k", Bytes::from_static(b"v"));
        clock.advance(Duration::from_secs(86_400 * 365));
        assert_eq!(cache.get("k").unwrap(), "v");
    }

    #[test]
    fn test_full_cache_prefers_expired_then_oldest() {
        let (cache, clock) = cache(60, 2);
        cache.put("old", Bytes::from_static(b"1"));
        clock.advance(Duration::from_secs(30));
        cache.put("newer", Bytes::from_static(b"2"));
        clock.advance(Duration::from_secs(1));

        cache.put("newest", Bytes::from_static(b"3"));
        assert_eq!(cache.len(), 2);
        assert!(cache.entry("old").is_none());

        // "newer" reaches its TTL first; expiry frees the slot before LRU.
        clock.advance(Duration::from_secs(59));
        cache.put("latest", Bytes::from_static(b"4"));
        assert!(cache.entry("newer").is_none());
        assert!(cache.entry("newest").is_some());
        assert!(cache.entry("latest").is_some());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_replacing_existing_key_does_not_evict() {
        let (cache, _) = cache(60, 1);
        cache.put("only", Bytes::from_static(b"1"));
        cache.put("only", Bytes::from_static(b"2"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            entries: 0,
            evictions: 0,
        };
        assert!((stats.hit_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
