//! Outbound calls to the fixed forwarding endpoint.
//!
//! # Responsibilities
//! - POST `{"url": <target>}` to the configured endpoint
//! - Return the upstream status and body untouched
//! - Map network failures to `ForwardError::Transport`
//!
//! The request deadline is enforced one level up by the gateway, so the
//! client here only carries a connect timeout.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::config::ForwardingConfig;
use crate::forwarding::types::{ForwardError, ForwardPayload, ForwardResult, UpstreamResponse};

/// Something that can forward a target URL and report what came back.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Forward `url` and return the raw response.
    ///
    /// # Errors
    /// Returns `ForwardError::Transport` when no response could be read.
    async fn call(&self, url: &str) -> ForwardResult<UpstreamResponse>;

    /// Endpoint identifier for logs.
    fn endpoint(&self) -> &str;
}

/// reqwest-backed upstream.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpUpstream {
    /// Client posting to `endpoint`.
    pub fn new(endpoint: Url, connect_timeout: Duration) -> ForwardResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .no_proxy()
            .build()
            .map_err(|e| ForwardError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// Client for the configured upstream endpoint.
    pub fn from_config(config: &ForwardingConfig) -> ForwardResult<Self> {
        let endpoint = Url::parse(&config.upstream_url).map_err(|e| ForwardError::InvalidUrl {
            url: config.upstream_url.clone(),
            reason: e.to_string(),
        })?;
        Self::new(endpoint, Duration::from_secs(config.connect_timeout_secs))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn call(&self, url: &str) -> ForwardResult<UpstreamResponse> {
        let payload = ForwardPayload {
            url: url.to_string(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Upstream request failed");
                ForwardError::Transport(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(endpoint = %self.endpoint, status, error = %e, "Failed to read upstream body");
            ForwardError::Transport(e.to_string())
        })?;

        Ok(UpstreamResponse { status, body })
    }

    fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}
