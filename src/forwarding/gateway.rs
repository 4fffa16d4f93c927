//! Cache-or-call forwarding.
//!
//! # Flow
//! ```text
//! forward(url)
//!     → validate absolute http(s) URL
//!     → cache hit?  → 200 + cached body, no outbound call
//!     → miss        → upstream.call(url) bounded by timeout
//!         → 2xx           → store body, return upstream status/body
//!         → non-2xx       → Upstream error, status/body passed through
//!         → timeout       → Timeout, cache untouched
//!         → network error → Transport, cache untouched
//! ```
//!
//! The cache write happens in the same task, after the bounded wait has
//! resolved with a response. Once the deadline fires the upstream future is
//! dropped, so a late success can never populate the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::GatewayConfig;
use crate::forwarding::cache::ResponseCache;
use crate::forwarding::types::{
    CacheStatus, ForwardError, ForwardOutcome, ForwardResponse, ForwardResult, CACHED_STATUS,
};
use crate::forwarding::upstream::{HttpUpstream, Upstream};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;

/// Orchestrates cache lookup, the outbound call and cache population.
#[derive(Clone)]
pub struct ForwardGateway {
    upstream: Arc<dyn Upstream>,
    cache: ResponseCache,
    timeout: Duration,
}

impl ForwardGateway {
    /// Create a gateway around an upstream, a cache and a deadline.
    pub fn new(upstream: Arc<dyn Upstream>, cache: ResponseCache, timeout: Duration) -> Self {
        Self {
            upstream,
            cache,
            timeout,
        }
    }

    /// Build the production gateway: reqwest upstream + configured cache.
    pub fn from_config(config: &GatewayConfig) -> ForwardResult<Self> {
        let upstream = HttpUpstream::from_config(&config.forwarding)?;
        let cache = ResponseCache::new(&config.cache);
        Ok(Self::new(
            Arc::new(upstream),
            cache,
            Duration::from_secs(config.forwarding.timeout_seconds),
        ))
    }

    /// Cache shared by every clone of this gateway.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Deadline applied to each upstream call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Serve `url` from cache or forward it upstream.
    pub async fn forward(&self, url: &str) -> ForwardOutcome {
        let outcome = self.forward_inner(url).await;

        let result = match &outcome {
            Ok(response) if response.cache == CacheStatus::Hit => "hit",
            Ok(_) => "miss_success",
            Err(e) => e.kind(),
        };
        metrics::record_forward(result);
        outcome
    }

    async fn forward_inner(&self, url: &str) -> ForwardOutcome {
        validate_target(url)?;

        if let Some(body) = self.cache.get(url) {
            tracing::debug!(url, "Cache hit");
            return Ok(ForwardResponse {
                status: CACHED_STATUS,
                body,
                cache: CacheStatus::Hit,
            });
        }

        tracing::debug!(url, endpoint = self.upstream.endpoint(), "Cache miss, forwarding");
        let started = Instant::now();
        let response = with_timeout(self.timeout, self.upstream.call(url)).await;
        metrics::record_upstream_duration(started);
        let response = response?;

        if response.is_success() {
            self.cache.put(url, response.body.clone());
            Ok(ForwardResponse {
                status: response.status,
                body: response.body,
                cache: CacheStatus::Miss,
            })
        } else {
            tracing::debug!(url, status = response.status, "Upstream returned non-success status");
            Err(ForwardError::Upstream {
                status: response.status,
                body: response.body,
            })
        }
    }
}

impl std::fmt::Debug for ForwardGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardGateway")
            .field("endpoint", &self.upstream.endpoint())
            .field("cache", &self.cache)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Accept only absolute http(s) URLs.
fn validate_target(url: &str) -> ForwardResult<()> {
    let invalid = |reason: String| ForwardError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}
