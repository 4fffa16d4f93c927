//! Admission entry points used by the HTTP layer.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::admission::bucket::ConsumptionResult;
use crate::admission::registry::{BucketRegistry, RegistryLimits};
use crate::admission::types::{AdmissionError, RateLimitKey};
use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Per-identity token-bucket rate limiter.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    registry: Arc<BucketRegistry>,
}

impl RateLimiter {
    /// Build a limiter on the system clock.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a limiter reading time from `clock`.
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let limits = RegistryLimits {
            requests_per_minute: config.requests_per_minute,
            max_keys: config.max_keys,
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
        };
        Self {
            registry: Arc::new(BucketRegistry::new(limits, clock)),
        }
    }

    /// Spend one token from an authenticated user's allowance.
    pub fn consume(&self, user_id: &str) -> Result<ConsumptionResult, AdmissionError> {
        if user_id.is_empty() {
            return Err(AdmissionError::EmptyKey);
        }
        Ok(self.consume_key(&RateLimitKey::user(user_id)))
    }

    /// Spend one token from a client address's public allowance.
    pub fn consume_public(&self, ip_address: &str) -> Result<ConsumptionResult, AdmissionError> {
        if ip_address.is_empty() {
            return Err(AdmissionError::EmptyKey);
        }
        Ok(self.consume_key(&RateLimitKey::public(ip_address)))
    }

    /// Tokens a user could spend right now. Does not create a bucket.
    pub fn remaining(&self, user_id: &str) -> Result<u64, AdmissionError> {
        if user_id.is_empty() {
            return Err(AdmissionError::EmptyKey);
        }
        Ok(self.peek(&RateLimitKey::user(user_id)))
    }

    /// Tokens a client address could spend right now. Does not create a bucket.
    pub fn remaining_public(&self, ip_address: &str) -> Result<u64, AdmissionError> {
        if ip_address.is_empty() {
            return Err(AdmissionError::EmptyKey);
        }
        Ok(self.peek(&RateLimitKey::public(ip_address)))
    }

    /// Underlying bucket registry.
    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    fn consume_key(&self, key: &RateLimitKey) -> ConsumptionResult {
        let class = key.class();
        loop {
            let bucket = self.registry.get_or_create(key, class);
            // A retired bucket has already left the map; the next lookup
            // resolves to its replacement.
            if let Some(result) = bucket.consume_live(self.registry.now()) {
                if !result.allowed {
                    tracing::debug!(
                        key = %key,
                        retry_after_ms = result.retry_after().as_millis() as u64,
                        "Rate limit exhausted"
                    );
                }
                metrics::record_admission(class.as_str(), result.allowed);
                return result;
            }
        }
    }

    fn peek(&self, key: &RateLimitKey) -> u64 {
        match self.registry.resolve(key) {
            Some(bucket) => bucket.available_tokens(self.registry.now()),
            None => self.registry.capacity_for(key.class()) as u64,
        }
    }

    /// Periodically evict idle buckets until shutdown is signalled.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.evict_idle();
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Bucket sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::bucket::REFILL_PERIOD;
    use crate::clock::ManualClock;
    use std::thread;

    fn limiter(rpm: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimitConfig {
            requests_per_minute: rpm,
            ..RateLimitConfig::default()
        };
        (RateLimiter::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn test_standard_capacity_then_denied() {
        let (limiter, _) = limiter(5);
        for expected_remaining in (0..5).rev() {
            let r = limiter.consume("alice").unwrap();
            assert!(r.allowed);
            assert_eq!(r.remaining_tokens, expected_remaining);
        }
        let denied = limiter.consume("alice").unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining_tokens, 0);
        assert_eq!(denied.retry_after(), Duration::from_secs(12));
    }

    #[test]
    fn test_public_class_has_floor_of_ten() {
        let (limiter, _) = limiter(4);
        let allowed = (0..20)
            .filter(|_| limiter.consume_public("10.0.0.9").unwrap().allowed)
            .count();
        assert_eq!(allowed, 10);
    }

    #[test]
    fn test_public_class_is_half_rate() {
        let (limiter, _) = limiter(100);
        let allowed = (0..100)
            .filter(|_| limiter.consume_public("10.0.0.9").unwrap().allowed)
            .count();
        assert_eq!(allowed, 50);
    }

    #[test]
    fn test_user_and_ip_with_same_text_do_not_share() {
        let (limiter, _) = limiter(10);
        for _ in 0..10 {
            assert!(limiter.consume("10.0.0.1").unwrap().allowed);
        }
        assert!(!limiter.consume("10.0.0.1").unwrap().allowed);
        assert!(limiter.consume_public("10.0.0.1").unwrap().allowed);
    }

    #[test]
    fn test_empty_keys_rejected() {
        let (limiter, _) = limiter(10);
        assert_eq!(limiter.consume(""), Err(AdmissionError::EmptyKey));
        assert_eq!(limiter.consume_public(""), Err(AdmissionError::EmptyKey));
        assert!(limiter.registry().is_empty());
    }

    #[test]
    fn test_remaining_does_not_consume_or_create() {
        let (limiter, clock) = limiter(10);
        assert_eq!(limiter.remaining("carol").unwrap(), 10);
        assert_eq!(limiter.remaining_public("1.1.1.1").unwrap(), 10);
        assert!(limiter.registry().is_empty());

        limiter.consume("carol").unwrap();
        assert_eq!(limiter.remaining("carol").unwrap(), 9);
        clock.advance(REFILL_PERIOD);
        assert_eq!(limiter.remaining("carol").unwrap(), 10);
    }

    #[test]
    fn test_exactly_capacity_allowed_under_contention() {
        let (limiter, _) = limiter(40);
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.consume("shared").unwrap().allowed)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 40);
    }

    #[test]
    fn test_evicted_key_gets_fresh_full_bucket() {
        let (limiter, clock) = limiter(10);
        for _ in 0..10 {
            limiter.consume("dave").unwrap();
        }
        clock.advance(REFILL_PERIOD * 10);
        assert_eq!(limiter.registry().evict_idle(), 1);

        let r = limiter.consume("dave").unwrap();
        assert!(r.allowed);
        assert_eq!(r.remaining_tokens, 9);
    }

    #[test]
    fn test_key_churn_cannot_refill_a_drained_user() {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimitConfig {
            requests_per_minute: 5,
            max_keys: 2,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::with_clock(&config, clock);

        let mut admitted = 0;
        for round in 0..10 {
            while limiter.consume("victim").unwrap().allowed {
                admitted += 1;
            }
            limiter.consume(&format!("churn-{}-a", round)).unwrap();
            limiter.consume(&format!("churn-{}-b", round)).unwrap();
        }

        assert_eq!(admitted, 5);
        assert_eq!(limiter.remaining("victim").unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_shutdown() {
        let (limiter, _) = limiter(10);
        let (tx, rx) = broadcast::channel(1);
        let handle = limiter.spawn_sweeper(Duration::from_secs(1), rx);

        time::sleep(Duration::from_secs(3)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
