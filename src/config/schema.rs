//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the admission gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-identity rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Upstream forwarding target and deadline.
    pub forwarding: ForwardingConfig,

    /// Response cache bounds.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Standard bucket capacity, restored over one minute.
    /// Public buckets get half of this, never fewer than 10.
    pub requests_per_minute: u32,

    /// Upper bound on tracked identities.
    pub max_keys: usize,

    /// Buckets untouched for this long are dropped (at least 60).
    pub idle_ttl_secs: u64,

    /// How often the idle sweep runs.
    pub sweep_interval_secs: u64,

    /// Header carrying an already-authenticated user id.
    ///
    /// Unset by default: callers then reach the standard class only through
    /// a `UserContext` inserted by an auth layer. Set it only when an
    /// authenticating proxy in front of the gateway strips and rewrites the
    /// header, since any client can send it.
    pub identity_header: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            max_keys: 100_000,
            idle_ttl_secs: 600,
            sweep_interval_secs: 60,
            identity_header: None,
        }
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Fixed upstream endpoint receiving `{"url": ...}` POSTs.
    pub upstream_url: String,

    /// Bound on the whole outbound call in seconds.
    pub timeout_seconds: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            upstream_url: "http://127.0.0.1:9000/forward".to_string(),
            timeout_seconds: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds; 0 keeps entries until replaced or evicted.
    pub ttl_secs: u64,

    /// Maximum number of cached URLs.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
