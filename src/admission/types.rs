//! Rate-limit identities and admission errors.

use std::fmt;
use thiserror::Error;

/// Which allowance a key draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateClass {
    /// Authenticated callers; capacity is the configured requests per minute.
    Standard,
    /// Unauthenticated callers keyed by address; half the standard rate,
    /// never below 10.
    Public,
}

impl RateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateClass::Standard => "standard",
            RateClass::Public => "public",
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaced rate-limit identity.
///
/// Authenticated ids live under `user:` and client addresses under
/// `public:`, so a user id can never collide with an IP string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

const USER_PREFIX: &str = "user:";
const PUBLIC_PREFIX: &str = "public:";

impl RateLimitKey {
    /// Key for an authenticated user.
    pub fn user(id: &str) -> Self {
        Self(format!("{USER_PREFIX}{id}"))
    }

    /// Key for an unauthenticated client address.
    pub fn public(ip: &str) -> Self {
        Self(format!("{PUBLIC_PREFIX}{ip}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rate class encoded in the key's prefix.
    pub fn class(&self) -> RateClass {
        if self.0.starts_with(PUBLIC_PREFIX) {
            RateClass::Public
        } else {
            RateClass::Standard
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised by the admission layer.
///
/// Running out of tokens is not an error; it is reported through
/// [`ConsumptionResult::allowed`](super::ConsumptionResult).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("rate-limit key must not be empty")]
    EmptyKey,
}
