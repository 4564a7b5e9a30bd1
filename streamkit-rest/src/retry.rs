//! Declarative retry.
//!
//! Whether an error is worth retrying is a property of the error kind,
//! declared in one place, instead of being scattered through call sites
//! as control flow.

use std::future::Future;
use std::time::Duration;

use crate::error::RestError;

/// How a failed request may be retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// The wait before retrying `error` after `attempt` failures, or
    /// `None` when the error is terminal.
    ///
    /// Transient server trouble and transport failures back off
    /// exponentially; rate limiting honors the server's Retry-After;
    /// everything else (auth, missing resources, decode bugs) is
    /// terminal — retrying cannot fix it.
    pub fn delay_for(&self, error: &RestError, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        match error {
            RestError::ServiceUnavailable | RestError::Transport(_) => {
                Some(self.backoff(attempt))
            }
            RestError::RateLimited { retry_after } => {
                Some(retry_after.unwrap_or_else(|| self.backoff(attempt)))
            }
            RestError::Unauthorized
            | RestError::NotFound
            | RestError::Api { .. }
            | RestError::Decode(_) => None,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        // First retry waits the initial delay, doubling from there.
        let exp = self
            .initial_delay
            .saturating_mul(1 << attempt.saturating_sub(1).min(16));
        exp.min(self.max_delay)
    }
}

/// Run `op` under `policy`, sleeping out the declared delays between
/// attempts. Returns the first success or the last error.
pub async fn execute_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RestError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                match policy.delay_for(&error, attempt) {
                    Some(delay) => {
                        tracing::debug!(
                            error = %error,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(error),
                }
            }
        }
    }
}
