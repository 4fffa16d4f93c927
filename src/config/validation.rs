//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates and timeouts > 0)
//! - Check that addresses and the upstream URL parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::admission::REFILL_PERIOD;
use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("forwarding.upstream_url is invalid: {0}")]
    InvalidUpstream(String),

    #[error("rate_limit.identity_header is not a valid header name: {0}")]
    InvalidHeader(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    let rl = &config.rate_limit;
    if rl.requests_per_minute == 0 {
        errors.push(ValidationError::NotPositive {
            field: "rate_limit.requests_per_minute",
        });
    }
    if rl.max_keys == 0 {
        errors.push(ValidationError::NotPositive {
            field: "rate_limit.max_keys",
        });
    }
    if rl.idle_ttl_secs < REFILL_PERIOD.as_secs() {
        errors.push(ValidationError::TooSmall {
            field: "rate_limit.idle_ttl_secs",
            min: REFILL_PERIOD.as_secs(),
        });
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::NotPositive {
            field: "rate_limit.sweep_interval_secs",
        });
    }
    if let Some(header) = &rl.identity_header {
        if axum::http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeader(header.clone()));
        }
    }

    let fwd = &config.forwarding;
    match Url::parse(&fwd.upstream_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::InvalidUpstream(format!(
            "unsupported scheme '{}'",
            url.scheme()
        ))),
        Err(e) => errors.push(ValidationError::InvalidUpstream(e.to_string())),
    }
    if fwd.timeout_seconds == 0 {
        errors.push(ValidationError::NotPositive {
            field: "forwarding.timeout_seconds",
        });
    }
    if fwd.connect_timeout_secs == 0 {
        errors.push(ValidationError::NotPositive {
            field: "forwarding.connect_timeout_secs",
        });
    }

    if config.cache.max_entries == 0 {
        errors.push(ValidationError::NotPositive {
            field: "cache.max_entries",
        });
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: obs.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
