//! Concurrent key → bucket registry.
//!
//! # Responsibilities
//! - Resolve a rate-limit key to exactly one live bucket
//! - Size new buckets by rate class
//! - Keep the key space bounded (idle expiry, overflow at capacity)
//!
//! # Design Decisions
//! - DashMap shards the map; creation goes through the shard-locked entry
//!   API so a creation race has a single winner
//! - Bucket counters are locked per bucket, never per shard
//! - Only idle buckets are ever evicted. Idle expiry is at least one refill
//!   period, so an evicted bucket was already full and re-creating it
//!   grants nothing extra
//! - When the map is full of active keys, new keys share one overflow
//!   bucket per class instead of displacing a live bucket

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::admission::bucket::{Bucket, REFILL_PERIOD};
use crate::admission::types::{RateClass, RateLimitKey};
use crate::clock::Clock;
use crate::observability::metrics;

/// Smallest allowance handed to unauthenticated callers.
pub const PUBLIC_CAPACITY_FLOOR: u32 = 10;

/// Minimum spacing of idle sweeps triggered by a full registry.
pub const ON_DEMAND_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of a public bucket for a given standard rate.
pub fn public_capacity(requests_per_minute: u32) -> u32 {
    (requests_per_minute / 2).max(PUBLIC_CAPACITY_FLOOR)
}

/// Sizing and bounds for a registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub requests_per_minute: u32,
    pub max_keys: usize,
    pub idle_ttl: Duration,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            max_keys: 100_000,
            idle_ttl: Duration::from_secs(600),
        }
    }
}

/// Shared map from rate-limit key to bucket.
///
/// `max_keys` is a hard bound on tracked keys. A creation that pushes the
/// map past it is rolled back and the key is served from its class's
/// overflow bucket until an idle sweep frees room.
pub struct BucketRegistry {
    buckets: DashMap<RateLimitKey, Arc<Bucket>>,
    overflow_standard: Arc<Bucket>,
    overflow_public: Arc<Bucket>,
    last_sweep: Mutex<Option<Instant>>,
    limits: RegistryLimits,
    clock: Arc<dyn Clock>,
}

impl BucketRegistry {
    /// Create an empty registry.
    ///
    /// `max_keys` is raised to at least 1 and `idle_ttl` to at least one
    /// refill period.
    pub fn new(limits: RegistryLimits, clock: Arc<dyn Clock>) -> Self {
        let limits = RegistryLimits {
            max_keys: limits.max_keys.max(1),
            idle_ttl: limits.idle_ttl.max(REFILL_PERIOD),
            ..limits
        };
        let now = clock.now();
        let overflow_standard = Arc::new(Bucket::new(limits.requests_per_minute.max(1), now));
        let overflow_public = Arc::new(Bucket::new(public_capacity(limits.requests_per_minute), now));
        Self {
            buckets: DashMap::new(),
            overflow_standard,
            overflow_public,
            last_sweep: Mutex::new(None),
            limits,
            clock,
        }
    }

    /// Effective limits after clamping.
    pub fn limits(&self) -> &RegistryLimits {
        &self.limits
    }

    /// Current time on the registry's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Bucket capacity for a rate class.
    pub fn capacity_for(&self, class: RateClass) -> u32 {
        match class {
            RateClass::Standard => self.limits.requests_per_minute.max(1),
            RateClass::Public => public_capacity(self.limits.requests_per_minute),
        }
    }

    /// Return the bucket for `key`, creating it on first use.
    ///
    /// When the registry is full and no bucket is idle, the class's shared
    /// overflow bucket is returned instead.
    pub fn get_or_create(&self, key: &RateLimitKey, class: RateClass) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.value().clone();
        }

        if self.buckets.len() >= self.limits.max_keys && !self.make_room() {
            return self.overflow(key, class);
        }

        let capacity = self.capacity_for(class);
        let now = self.clock.now();
        let mut created = false;
        let bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Bucket::new(capacity, now))
            })
            .value()
            .clone();

        if !created {
            return bucket;
        }

        // Concurrent creators can each pass the capacity check above; the
        // ones that land past the cap back out.
        if self.buckets.len() > self.limits.max_keys {
            let rolled_back = self
                .buckets
                .remove_if(key, |_, current| {
                    if Arc::ptr_eq(current, &bucket) {
                        current.retire();
                        true
                    } else {
                        false
                    }
                })
                .is_some();
            if rolled_back {
                return self.overflow(key, class);
            }
        }

        tracing::debug!(key = %key, class = %class, capacity, "Created rate-limit bucket");
        metrics::record_bucket_count(self.buckets.len());
        bucket
    }

    /// Look up without creating.
    pub fn get(&self, key: &RateLimitKey) -> Option<Arc<Bucket>> {
        self.buckets.get(key).map(|b| b.value().clone())
    }

    /// The bucket `key` would consume from right now, without creating one.
    pub fn resolve(&self, key: &RateLimitKey) -> Option<Arc<Bucket>> {
        self.get(key).or_else(|| {
            (self.buckets.len() >= self.limits.max_keys)
                .then(|| self.overflow_bucket(key.class()).clone())
        })
    }

    /// Number of keys with their own bucket.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no key has its own bucket.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop every bucket idle for at least the configured TTL.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let idle_ttl = self.limits.idle_ttl;
        let mut evicted = 0;

        self.buckets.retain(|_, bucket| {
            if bucket.retire_if_idle(now, idle_ttl) {
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.buckets.len(), "Evicted idle rate-limit buckets");
            metrics::record_bucket_evictions(evicted);
            metrics::record_bucket_count(self.buckets.len());
        }
        evicted
    }

    /// Sweep idle buckets if the last on-demand sweep is old enough.
    /// Returns true when there is room for a new key.
    fn make_room(&self) -> bool {
        let now = self.clock.now();
        let due = {
            let mut last = self.last_sweep.lock().unwrap_or_else(|e| e.into_inner());
            let due = last.map_or(true, |at| {
                now.saturating_duration_since(at) >= ON_DEMAND_SWEEP_INTERVAL
            });
            if due {
                *last = Some(now);
            }
            due
        };

        if due {
            self.evict_idle();
        }
        self.buckets.len() < self.limits.max_keys
    }

    fn overflow(&self, key: &RateLimitKey, class: RateClass) -> Arc<Bucket> {
        tracing::debug!(
            key = %key,
            max_keys = self.limits.max_keys,
            "Rate-limit registry full, using shared overflow bucket"
        );
        metrics::record_bucket_overflow(class.as_str());
        self.overflow_bucket(class).clone()
    }

    fn overflow_bucket(&self, class: RateClass) -> &Arc<Bucket> {
        match class {
            RateClass::Standard => &self.overflow_standard,
            RateClass::Public => &self.overflow_public,
        }
    }
}

impl std::fmt::Debug for BucketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketRegistry")
            .field("buckets", &self.buckets.len())
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn registry(rpm: u32, max_keys: usize) -> (BucketRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limits = RegistryLimits {
            requests_per_minute: rpm,
            max_keys,
            idle_ttl: REFILL_PERIOD,
        };
        (BucketRegistry::new(limits, clock.clone()), clock)
    }

    #[test]
    fn test_public_capacity_floor() {
        assert_eq!(public_capacity(100), 50);
        assert_eq!(public_capacity(10), 10);
        assert_eq!(public_capacity(21), 10);
        assert_eq!(public_capacity(23), 11);
        assert_eq!(public_capacity(1), 10);
    }

    #[test]
    fn test_capacity_by_class() {
        let (registry, _) = registry(100, 16);
        let user = registry.get_or_create(&RateLimitKey::user("alice"), RateClass::Standard);
        let public = registry.get_or_create(&RateLimitKey::public("1.2.3.4"), RateClass::Public);
        assert_eq!(user.capacity(), 100);
        assert_eq!(public.capacity(), 50);
    }

    #[test]
    fn test_same_key_same_bucket() {
        let (registry, _) = registry(10, 16);
        let key = RateLimitKey::user("bob");
        let a = registry.get_or_create(&key, RateClass::Standard);
        let b = registry.get_or_create(&key, RateClass::Standard);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_creation_race_has_single_winner() {
        let (registry, _) = registry(10, 1024);
        let registry = Arc::new(registry);
        let key = RateLimitKey::user("contended");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let key = key.clone();
                thread::spawn(move || registry.get_or_create(&key, RateClass::Standard))
            })
            .collect();

        let buckets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(buckets.iter().all(|b| Arc::ptr_eq(b, &buckets[0])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_idle_buckets_are_evicted() {
        let (registry, clock) = registry(10, 16);
        let idle = RateLimitKey::user("idle");
        let active = RateLimitKey::user("active");
        let idle_bucket = registry.get_or_create(&idle, RateClass::Standard);
        registry.get_or_create(&active, RateClass::Standard);

        clock.advance(Duration::from_secs(30));
        registry
            .get(&active)
            .unwrap()
            .consume(clock.now());
        clock.advance(Duration::from_secs(30));

        assert_eq!(registry.evict_idle(), 1);
        assert!(registry.get(&idle).is_none());
        assert!(registry.get(&active).is_some());
        assert!(idle_bucket.consume_live(clock.now()).is_none());
    }

    #[test]
    fn test_full_registry_evicts_only_idle_buckets() {
        let (registry, clock) = registry(10, 2);
        let idle = RateLimitKey::user("idle");
        let active = RateLimitKey::user("active");
        registry.get_or_create(&idle, RateClass::Standard);
        registry.get_or_create(&active, RateClass::Standard);

        clock.advance(Duration::from_secs(59));
        registry.get(&active).unwrap().consume(clock.now());
        clock.advance(Duration::from_secs(1));

        let newcomer = RateLimitKey::user("newcomer");
        registry.get_or_create(&newcomer, RateClass::Standard);

        assert_eq!(registry.len(), 2);
        assert!(registry.get(&idle).is_none());
        assert!(registry.get(&active).is_some());
        assert!(registry.get(&newcomer).is_some());
    }

    #[test]
    fn test_full_registry_never_resets_a_drained_key() {
        let (registry, _clock) = registry(5, 2);
        let drained = RateLimitKey::user("drained");
        let mut admitted = 0;

        for round in 0..10 {
            let bucket = registry.get_or_create(&drained, RateClass::Standard);
            while bucket.consume(registry.now()).allowed {
                admitted += 1;
            }
            for n in 0..2 {
                let key = RateLimitKey::user(&format!("churn-{}-{}", round, n));
                registry.get_or_create(&key, RateClass::Standard);
            }
        }

        assert_eq!(admitted, 5);
        assert!(registry.get(&drained).is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_overflow_keys_share_one_allowance() {
        let (registry, _clock) = registry(4, 1);
        registry.get_or_create(&RateLimitKey::user("resident"), RateClass::Standard);

        let mut admitted = 0;
        for n in 0..20 {
            let key = RateLimitKey::user(&format!("late-{}", n));
            let bucket = registry.get_or_create(&key, RateClass::Standard);
            if bucket.consume(registry.now()).allowed {
                admitted += 1;
            }
            assert!(registry.get(&key).is_none());
        }

        assert_eq!(admitted, 4);
        let public = registry.get_or_create(&RateLimitKey::public("203.0.113.1"), RateClass::Public);
        assert_eq!(public.capacity(), 10);
        assert_eq!(public.available_tokens(registry.now()), 10);
    }

    #[test]
    fn test_concurrent_creation_respects_max_keys() {
        let (registry, _) = registry(10, 8);
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..32)
            .map(|n| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let key = RateLimitKey::user(&format!("user-{}", n));
                    registry.get_or_create(&key, RateClass::Standard);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.len() <= 8, "len {}", registry.len());
    }

    #[test]
    fn test_idle_ttl_never_below_refill_period() {
        let clock = Arc::new(ManualClock::new());
        let limits = RegistryLimits {
            requests_per_minute: 10,
            max_keys: 0,
            idle_ttl: Duration::from_secs(1),
        };
        let registry = BucketRegistry::new(limits, clock);
        assert_eq!(registry.limits().idle_ttl, REFILL_PERIOD);
        assert_eq!(registry.limits().max_keys, 1);
    }
}
