//! Forward outcome → HTTP response.
//!
//! # Responsibilities
//! - Pass upstream status and body through unchanged
//! - Tag responses with `x-cache: HIT|MISS`
//! - Map local failures to gateway status codes (502, 504, 400)

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::forwarding::{CacheStatus, ForwardError, ForwardOutcome};

pub const X_CACHE: &str = "x-cache";

/// Build the client response for a forward outcome.
pub fn outcome_response(outcome: ForwardOutcome) -> Response {
    match outcome {
        Ok(forwarded) => with_cache_header(
            Response::new(Body::from(forwarded.body)),
            forwarded.status,
            forwarded.cache,
        ),
        Err(ForwardError::Upstream { status, body }) => {
            with_cache_header(Response::new(Body::from(body)), status, CacheStatus::Miss)
        }
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, e.to_string()).into_response()
        }
    }
}

fn with_cache_header(mut response: Response, status: u16, cache: CacheStatus) -> Response {
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    response.headers_mut().insert(
        HeaderName::from_static(X_CACHE),
        HeaderValue::from_static(cache.as_str()),
    );
    response
}
