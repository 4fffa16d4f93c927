//! Forwarding payloads, outcomes and errors.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Status reported for bodies served from the cache.
pub const CACHED_STATUS: u16 = 200;

/// Wire payload sent to the upstream: `{"url": "<target>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardPayload {
    pub url: String,
}

/// Whether a response came from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Raw reply from the upstream, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A successful forward, cached or fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    pub status: u16,
    pub body: Bytes,
    pub cache: CacheStatus,
}

/// Errors that can occur while forwarding.
///
/// None of these is ever written to the response cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForwardError {
    /// Target is not an absolute http(s) URL; upstream was not called.
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Upstream did not answer within the configured bound.
    #[error("Upstream timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// Connection refused, DNS failure, broken body stream.
    #[error("Upstream transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status; passed through as-is.
    #[error("Upstream returned status {status}")]
    Upstream { status: u16, body: Bytes },
}

impl ForwardError {
    /// Short classification used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidUrl { .. } => "invalid_url",
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Transport(_) => "transport_error",
            ForwardError::Upstream { .. } => "upstream_error",
        }
    }

    /// HTTP status to surface to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            ForwardError::InvalidUrl { .. } => 400,
            ForwardError::Timeout(_) => 504,
            ForwardError::Transport(_) => 502,
            ForwardError::Upstream { status, .. } => *status,
        }
    }
}

/// Result type for forwarding operations.
pub type ForwardResult<T> = Result<T, ForwardError>;

/// What `forward` hands back to its caller.
pub type ForwardOutcome = ForwardResult<ForwardResponse>;
