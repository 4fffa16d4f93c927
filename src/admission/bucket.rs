//! Token bucket with lazy, continuous refill.
//!
//! Tokens are restored in proportion to elapsed time whenever the bucket is
//! touched; there is no background timer. The count is kept as `f64` so that
//! frequent calls never lose fractional refill progress.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Time over which a bucket's full capacity is restored.
pub const REFILL_PERIOD: Duration = Duration::from_secs(60);

/// Outcome of a single consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionResult {
    /// Whether a token was taken.
    pub allowed: bool,
    /// Whole tokens left after this attempt.
    pub remaining_tokens: u64,
    /// Time until at least one token is available. Zero when allowed.
    pub nanos_until_next_token: u64,
}

impl ConsumptionResult {
    /// Retry hint as a duration.
    pub fn retry_after(&self) -> Duration {
        Duration::from_nanos(self.nanos_until_next_token)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    /// Set when the registry evicts this bucket; a retired bucket never
    /// grants tokens to registry callers again.
    retired: bool,
}

/// A single rate-limit bucket.
///
/// All state transitions for one bucket happen under its own mutex, so two
/// callers can never both spend the last token.
#[derive(Debug)]
pub struct Bucket {
    capacity: u32,
    refill_period: Duration,
    state: Mutex<BucketState>,
}

impl Bucket {
    /// Create a full bucket with the standard one-minute refill period.
    pub fn new(capacity: u32, now: Instant) -> Self {
        Self::with_refill_period(capacity, REFILL_PERIOD, now)
    }

    /// Create a full bucket with a custom refill period.
    pub fn with_refill_period(capacity: u32, refill_period: Duration, now: Instant) -> Self {
        let capacity = capacity.max(1);
        let refill_period = if refill_period.is_zero() {
            REFILL_PERIOD
        } else {
            refill_period
        };

        Self {
            capacity,
            refill_period,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: now,
                retired: false,
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    /// Take one token if available.
    pub fn consume(&self, now: Instant) -> ConsumptionResult {
        let mut state = self.lock();
        self.take(&mut state, now)
    }

    /// Like [`consume`](Self::consume) but yields `None` once the bucket has
    /// been retired by its registry.
    pub(crate) fn consume_live(&self, now: Instant) -> Option<ConsumptionResult> {
        let mut state = self.lock();
        if state.retired {
            return None;
        }
        Some(self.take(&mut state, now))
    }

    /// Whole tokens that would be available at `now`, without taking any.
    pub fn available_tokens(&self, now: Instant) -> u64 {
        let state = self.lock();
        let tokens = (state.tokens + self.refill_amount(state.last_refill, now))
            .min(self.capacity as f64);
        tokens.floor() as u64
    }

    /// Instant of the most recent refill computation, i.e. the last access.
    pub fn last_seen(&self) -> Instant {
        self.lock().last_refill
    }

    /// Retire the bucket if it has not been touched for at least `idle_ttl`.
    pub(crate) fn retire_if_idle(&self, now: Instant, idle_ttl: Duration) -> bool {
        let mut state = self.lock();
        if now.saturating_duration_since(state.last_refill) >= idle_ttl {
            state.retired = true;
        }
        state.retired
    }

    /// Retire unconditionally.
    pub(crate) fn retire(&self) {
        self.lock().retired = true;
    }

    fn take(&self, state: &mut BucketState, now: Instant) -> ConsumptionResult {
        self.refill(state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            ConsumptionResult {
                allowed: true,
                remaining_tokens: state.tokens.floor() as u64,
                nanos_until_next_token: 0,
            }
        } else {
            ConsumptionResult {
                allowed: false,
                remaining_tokens: 0,
                nanos_until_next_token: self.nanos_for(1.0 - state.tokens),
            }
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // A caller that sampled `now` before another caller took the lock
        // sees zero elapsed time; last_refill never moves backwards.
        if now <= state.last_refill {
            return;
        }
        let added = self.refill_amount(state.last_refill, now);
        state.tokens = (state.tokens + added).min(self.capacity as f64);
        state.last_refill = now;
    }

    fn refill_amount(&self, since: Instant, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(since);
        self.capacity as f64 * elapsed.as_secs_f64() / self.refill_period.as_secs_f64()
    }

    fn nanos_for(&self, deficit: f64) -> u64 {
        let nanos_per_token = self.refill_period.as_nanos() as f64 / self.capacity as f64;
        (deficit * nanos_per_token).ceil().max(1.0) as u64
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // Bucket state is two plain numbers and a flag; a panic elsewhere
        // cannot leave it half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
