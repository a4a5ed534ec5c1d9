//! Bounded retry of optimistic writes
//!
//! An attempt re-reads everything it needs, so replaying it after a version
//! conflict is always safe. Every other error is returned immediately.

use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;

use super::error::{LifecycleError, LifecycleResult};
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_interval: Duration,
    /// Hard ceiling on time spent retrying one operation
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(10),
            max_elapsed: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, max_elapsed: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_elapsed,
            ..Self::default()
        }
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy runs out.
///
/// Exhausted version conflicts surface as [`LifecycleError::Concurrency`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> LifecycleResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LifecycleResult<T>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_elapsed_time(Some(policy.max_elapsed))
        .build();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0u32;

    let result = backoff::future::retry(backoff, || {
        attempts += 1;
        let current = attempts;
        let fut = attempt();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_retryable() && current < max_attempts => {
                    tracing::warn!(operation, attempt = current, error = %err, "Version conflict, retrying");
                    Err(backoff::Error::transient(err))
                }
                Err(err) => Err(backoff::Error::permanent(err)),
            }
        }
    })
    .await;

    result.map_err(|err| match err {
        LifecycleError::Store(StoreError::VersionConflict { entity, id }) => {
            tracing::warn!(operation, attempts, entity, %id, "Giving up after repeated version conflicts");
            LifecycleError::Concurrency {
                entity,
                id,
                attempts,
            }
        }
        other => other,
    })
}
