//! Retry with exponential backoff and a per-attempt timeout around agent calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::GenerationError;
use crate::metrics::METRICS;

/// Retry settings for a single agent call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 200,
            timeout_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.backoff_base_ms
                .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))),
        )
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// A timed-out attempt counts as a failed attempt. When every attempt fails
/// the result is [`GenerationError::Exhausted`] carrying the last error.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let max_attempts = policy.max_retries + 1;
    let timeout = Duration::from_millis(policy.timeout_ms);
    let mut last_error = GenerationError::Unavailable("no attempt made".into());

    for attempt in 1..=max_attempts {
        let outcome = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(GenerationError::Timeout {
                elapsed_ms: policy.timeout_ms,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(call = %label, attempt, max_attempts, error = %err, "generation attempt failed");
                last_error = err;
                if attempt < max_attempts {
                    METRICS.inc_generation_retries();
                    tokio::time::sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }

    Err(GenerationError::Exhausted {
        attempts: max_attempts,
        last_error: last_error.to_string(),
    })
}
