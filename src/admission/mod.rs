//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → identity (user id or client IP)
//!     → types.rs (namespaced RateLimitKey: user:<id> / public:<ip>)
//!     → registry.rs (get-or-create bucket, sized by rate class)
//!     → bucket.rs (lazy refill, take one token)
//!     → ConsumptionResult (allowed, remaining, retry hint)
//! ```
//!
//! # Design Decisions
//! - Refill is computed on access; no timer per bucket
//! - Time is injected through `Clock` so refill arithmetic is testable
//! - Distinct keys never contend on the same lock
//! - The registry is bounded; a background sweeper drops idle buckets

pub mod bucket;
pub mod limiter;
pub mod registry;
pub mod types;

pub use bucket::{Bucket, ConsumptionResult, REFILL_PERIOD};
pub use limiter::RateLimiter;
pub use registry::{public_capacity, BucketRegistry, RegistryLimits};
pub use types::{AdmissionError, RateClass, RateLimitKey};
