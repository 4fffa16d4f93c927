//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (identify caller, spend one token)
//!     → allowed: pass to handler, annotate remaining tokens
//!     → denied: 429 + Retry-After
//! ```
//!
//! # Design Decisions
//! - Authentication happens elsewhere; this layer trusts `UserContext`,
//!   and an identity header only when one is configured
//! - Unauthenticated callers are charged to their client IP

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, AdmissionState, Identity, UserContext};
