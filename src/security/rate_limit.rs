//! Rate limiting middleware with authenticated and public classes.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::admission::{ConsumptionResult, RateLimiter};
use crate::observability::metrics;

pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Identity attached by an authentication layer in front of this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
}

/// State for the rate-limit middleware.
#[derive(Clone, Debug)]
pub struct AdmissionState {
    pub limiter: RateLimiter,
    /// Header trusted to carry a user id; `None` trusts only `UserContext`.
    pub identity_header: Option<HeaderName>,
}

/// Who a request is charged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(String),
    Public(String),
}

/// Resolve the caller: auth context, then the trusted header when one is
/// configured, then client IP.
pub fn identify(request: &Request<Body>, identity_header: Option<&HeaderName>) -> Identity {
    if let Some(ctx) = request.extensions().get::<UserContext>() {
        if !ctx.user_id.is_empty() {
            return Identity::User(ctx.user_id.clone());
        }
    }

    let from_header = identity_header
        .and_then(|name| request.headers().get(name))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(user_id) = from_header {
        return Identity::User(user_id.to_string());
    }

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Identity::Public(ip)
}

/// Whole seconds to advertise in `Retry-After`, rounded up.
pub fn retry_after_secs(nanos_until_next_token: u64) -> u64 {
    nanos_until_next_token.div_ceil(1_000_000_000).max(1)
}

/// Middleware function for per-identity rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<AdmissionState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identity = identify(&request, state.identity_header.as_ref());
    let decision = match &identity {
        Identity::User(id) => state.limiter.consume(id),
        Identity::Public(ip) => state.limiter.consume_public(ip),
    };

    let decision = match decision {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting request without usable identity");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    if decision.allowed {
        let mut response = next.run(request).await;
        set_remaining(&mut response, &decision);
        response
    } else {
        tracing::warn!(
            client = ?identity,
            retry_after_ms = decision.retry_after().as_millis() as u64,
            "Rate limit exceeded"
        );
        metrics::record_request("forward", StatusCode::TOO_MANY_REQUESTS.as_u16());

        let mut response = (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
        set_remaining(&mut response, &decision);
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(retry_after_secs(decision.nanos_until_next_token)),
        );
        response
    }
}

fn set_remaining(response: &mut Response, decision: &ConsumptionResult) {
    response.headers_mut().insert(
        HeaderName::from_static(RATE_LIMIT_REMAINING),
        HeaderValue::from(decision.remaining_tokens),
    );
}
