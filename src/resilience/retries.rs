//! Retry logic.
//!
//! # Responsibilities
//! - Re-run an async operation while its error is retryable
//! - Sleep between attempts per a [`Backoff`] schedule
//! - Give up after the schedule's step budget and surface the last error
//!
//! # Design Decisions
//! - Conflicts are the only retryable store error for status writes
//! - NotFound is never retried; callers treat it as termination
//! - Callers own cancellation by racing the returned future

use std::fmt::Display;
use std::future::Future;

use crate::resilience::backoff::Backoff;
use crate::store::StoreError;

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// backoff's steps are exhausted.
pub async fn retry_on_error<T, E, F, Fut, P>(backoff: Backoff, retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let steps = backoff.steps.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < steps && retryable(&e) => {
                let delay = backoff.delay(attempt);
                tracing::debug!(attempt, delay = ?delay, error = %e, "Retrying operation");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Retry an optimistic-concurrency write while the store reports a conflict.
pub async fn retry_on_conflict<T, F, Fut>(backoff: Backoff, op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let result = retry_on_error(backoff, StoreError::is_conflict, op).await;
    if let Err(e) = &result {
        if e.is_conflict() {
            crate::observability::metrics::record_conflict_exhausted();
        }
    }
    result
}
