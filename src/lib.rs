//! Admission-controlled forwarding gateway.
//!
//! Per-identity token-bucket admission in front of a caching,
//! timeout-bounded forwarder.

// Core subsystems
pub mod admission;
pub mod clock;
pub mod config;
pub mod forwarding;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use admission::RateLimiter;
pub use config::GatewayConfig;
pub use forwarding::ForwardGateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
