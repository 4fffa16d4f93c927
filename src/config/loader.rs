//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_REQUESTS_PER_MINUTE: &str = "GATEWAY_REQUESTS_PER_MINUTE";
pub const ENV_TIMEOUT_SECONDS: &str = "GATEWAY_TIMEOUT_SECONDS";
pub const ENV_UPSTREAM_URL: &str = "GATEWAY_UPSTREAM_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the environment, and validate a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    finish(config, |var| std::env::var(var).ok())
}

/// Defaults plus environment overrides, for running without a file.
pub fn load_defaults() -> Result<GatewayConfig, ConfigError> {
    finish(GatewayConfig::default(), |var| std::env::var(var).ok())
}

fn finish<F>(mut config: GatewayConfig, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut GatewayConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = env(ENV_REQUESTS_PER_MINUTE) {
        config.rate_limit.requests_per_minute = value.trim().parse::<u32>().map_err(|_| ConfigError::Env {
            var: ENV_REQUESTS_PER_MINUTE,
            value: value.clone(),
        })?;
    }
    if let Some(value) = env(ENV_TIMEOUT_SECONDS) {
        config.forwarding.timeout_seconds = value.trim().parse::<u64>().map_err(|_| ConfigError::Env {
            var: ENV_TIMEOUT_SECONDS,
            value: value.clone(),
        })?;
    }
    if let Some(value) = env(ENV_UPSTREAM_URL) {
        config.forwarding.upstream_url = value;
    }
    Ok(())
}
