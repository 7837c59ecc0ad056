//! Bounded retry for optimistic-concurrency conflicts.
//!
//! A conflicting write is never re-sent as-is: every attempt reloads the
//! current state first and re-applies the intended change on top of it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// How many times a conflicting operation is attempted, and how long to
/// wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than one.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n * backoff` before the next try.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);

    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Retries without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BACKOFF)
    }
}

/// Returned when every attempt of an operation ended in a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} gave up after {attempts} conflicting attempts")]
pub struct RetryExhausted {
    pub operation: &'static str,
    pub attempts: u32,
}

/// Runs `attempt` until it succeeds, fails with a non-conflict error, or
/// the policy's attempt budget is spent.
pub async fn retry_on_conflict<T, E, C, A, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    is_conflict: C,
    attempt: A,
) -> Result<T, E>
where
    C: Fn(&E) -> bool,
    A: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<RetryExhausted> + std::fmt::Display,
{
    let mut attempts = 1;
    loop {
        match attempt().await {
            Err(e) if is_conflict(&e) => {
                if attempts >= policy.max_attempts {
                    metrics::counter!("cart_conflicts_exhausted_total", "operation" => operation)
                        .increment(1);
                    tracing::warn!(operation, attempts, error = %e, "Conflict retries exhausted");
                    return Err(RetryExhausted {
                        operation,
                        attempts,
                    }
                    .into());
                }

                metrics::counter!("cart_conflict_retries_total", "operation" => operation)
                    .increment(1);
                tracing::warn!(operation, attempt = attempts, error = %e, "Conflict, retrying");

                let delay = policy.delay_after(attempts);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempts += 1;
            }
            other => return other,
        }
    }
}

/// Reloads state with `reload` and re-applies the change with `reapply`,
/// retrying the pair on conflict.
///
/// A conflict raised by either step counts against the budget.
pub async fn retry_with_reload<S, T, E, C, L, LFut, R, RFut>(
    policy: &RetryPolicy,
    operation: &'static str,
    is_conflict: C,
    reload: L,
    reapply: R,
) -> Result<T, E>
where
    C: Fn(&E) -> bool,
    L: Fn() -> LFut,
    LFut: Future<Output = Result<S, E>>,
    R: Fn(S) -> RFut,
    RFut: Future<Output = Result<T, E>>,
    E: From<RetryExhausted> + std::fmt::Display,
{
    let reload = &reload;
    let reapply = &reapply;
    retry_on_conflict(policy, operation, is_conflict, move || async move {
        let state = reload().await?;
        reapply(state).await
    })
    .await
}
