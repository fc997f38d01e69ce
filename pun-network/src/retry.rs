//! Bounded retry for calls to the Punster services.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use punster_agent::PunsterError;

use crate::config::RetryConfig;

/// How calls to external services are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    /// Delay before the first retry; retry `k` waits `base_delay * k`
    pub base_delay: Duration,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
    /// Whether schema-invalid responses are retried
    pub retry_malformed: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            retry_malformed: config.retry_malformed,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, without delays. Useful in tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Whether a failure may be retried under this policy.
    pub fn should_retry(&self, error: &PunsterError) -> bool {
        !error.is_malformed() || self.retry_malformed
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }
}

/// A call that failed after exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    /// Attempts made, including the first
    pub attempts: u32,
    /// The last error seen
    pub last_error: PunsterError,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PunsterError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = match tokio::time::timeout(policy.attempt_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(PunsterError::Timeout),
        };

        let error = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let retries_left = attempt <= policy.max_retries;
        if !retries_left || !policy.should_retry(&error) {
            error!(
                operation = operation_name,
                attempts = attempt,
                error = %error,
                "Giving up on {}",
                operation_name
            );
            return Err(RetryFailure {
                attempts: attempt,
                last_error: error,
            });
        }

        warn!(
            operation = operation_name,
            attempt,
            error = %error,
            "Attempt failed, retrying"
        );

        let delay = policy.delay_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
