//! Deadline enforcement for origin calls.
//!
//! A deadline is an absolute instant computed once when the outbound request
//! is built. Exceeding it drops (cancels) the in-flight future and yields
//! [`ProxyError::OriginTimeout`]. No retries are attempted.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ProxyError;

/// Deadline `timeout` from now.
pub fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

/// Run `fut` until `deadline`.
///
/// `budget` is only used to describe the failure.
pub async fn with_deadline<T, F>(deadline: Instant, budget: Duration, fut: F) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProxyError::OriginTimeout(budget)),
    }
}
