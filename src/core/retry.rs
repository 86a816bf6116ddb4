//! core::retry
//!
//! Retry helper for transient store failures.
//!
//! # Design
//!
//! Only operations whose semantics are idempotent may sit behind this
//! helper: the score upsert and the post claim converge to the same state
//! when repeated, so a retry after a transient failure is safe. Errors
//! classify themselves through [`Transient`]; anything non-transient
//! (validation, not-found, conflict) is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::core::config::RetryConfig;

/// Classifies errors that are safe to retry.
pub trait Transient {
    /// Whether the error is a transient availability failure.
    fn is_transient(&self) -> bool;
}

/// Run `op`, retrying transient failures per `policy`.
///
/// Backoff is linear: attempt `n` sleeps `n * base_delay_ms` before the
/// next try. The final error is returned once attempts are exhausted.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryConfig, mut op: F) -> Result<T, E>
where
    E: Transient,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.base_delay_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
