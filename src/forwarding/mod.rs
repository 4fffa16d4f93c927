//! Caching forward subsystem.
//!
//! # Data Flow
//! ```text
//! forward(url)
//!     → gateway.rs (validate, orchestrate)
//!     → cache.rs (lookup by URL; hit returns immediately)
//!     → upstream.rs (POST {"url": url} to fixed endpoint)
//!     → resilience::timeouts (bounded wait)
//!     → cache.rs (store on 2xx only)
//! ```
//!
//! # Design Decisions
//! - Only successful responses are cached; errors never poison the cache
//! - Upstream status codes are passed through, never reinterpreted
//! - No internal retries

pub mod cache;
pub mod gateway;
pub mod types;
pub mod upstream;

pub use cache::{CacheStats, ResponseCache};
pub use gateway::ForwardGateway;
pub use types::{
    CacheStatus, ForwardError, ForwardOutcome, ForwardPayload, ForwardResponse, ForwardResult,
    UpstreamResponse,
};
pub use upstream::{HttpUpstream, Upstream};
