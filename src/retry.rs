// ============================================================================
// Retry Logic
// ============================================================================
//
// Bounded retry with exponential backoff for transient failures.
//
// - `max_attempts` counts every attempt, the first one included
// - the delay before attempt n+1 is initial_backoff * 2^(n-1), capped
// - only errors with `StampError::is_transient()` are retried; anything
//   else is returned immediately
// - an exhausted budget is reported through `StampError::exhausted`, which
//   keeps the error's failure family
//
// ============================================================================

use blocketch_config::PipelineConfig;
use blocketch_error::StampResult;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Proof request policy (MAX_RETRY_ATTEMPTS)
    pub fn for_proof_requests(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_retry_attempts,
            config.initial_backoff,
            config.max_backoff,
        )
    }

    /// Durable write policy (STORAGE_MAX_ATTEMPTS)
    pub fn for_storage(config: &PipelineConfig) -> Self {
        Self::new(
            config.storage_max_attempts,
            config.initial_backoff,
            config.max_backoff,
        )
    }

    /// Confirmation delivery policy (DELIVERY_MAX_ATTEMPTS)
    pub fn for_delivery(config: &PipelineConfig) -> Self {
        Self::new(
            config.delivery_max_attempts,
            config.initial_backoff,
            config.max_backoff,
        )
    }

    /// Delay after `failed_attempt` (1-based) failed
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }

    /// Whether another attempt is allowed after `attempt` failed
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Execute an operation with retry logic
///
/// # Arguments
/// * `policy` - Attempt budget and backoff curve
/// * `operation_name` - Name of the operation for logging
/// * `operation` - Closure producing one attempt; receives the 1-based attempt number
///
/// # Returns
/// The operation result, the first non-transient error, or the last
/// transient error wrapped as exhausted
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> StampResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StampResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_transient() && policy.allows_retry(attempt) => {
                let backoff = policy.backoff(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => return Err(e.exhausted(attempt)),
            Err(e) => return Err(e),
        }
    }
}
