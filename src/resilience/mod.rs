//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (enforce request deadline)
//!     → On expiry: in-flight call dropped, Timeout surfaced to caller
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No internal retries; retry policy belongs to the caller

pub mod timeouts;

pub use timeouts::with_timeout;
