//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream calls with a deadline
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the wrapped future is dropped when the
//!   deadline passes, so nothing it would have done afterwards can happen
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use crate::forwarding::types::{ForwardError, ForwardResult};

/// Run `future` to completion or fail with [`ForwardError::Timeout`].
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> ForwardResult<T>
where
    F: Future<Output = ForwardResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Upstream call timed out");
            Err(ForwardError::Timeout(limit))
        }
    }
}
