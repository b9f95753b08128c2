//! Bounded retry with backoff
//!
//! Every network-facing call (upload, delete, HEAD, GET) and opening the
//! source dump goes through [`with_retry`]. Errors that are not
//! [retryable](crate::Error::is_retryable) are returned immediately.

use crate::error::{Error, Result};
use crate::types::BackoffType;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to attempt an operation and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_backoff_ms: u64,
    /// Growth of the delay between attempts
    pub backoff: BackoffType,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            backoff: BackoffType::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt count and default backoff
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the backoff curve
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffType, initial: Duration, max: Duration) -> Self {
        self.backoff = backoff;
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Retry immediately, without sleeping
    #[must_use]
    pub fn without_delay(mut self) -> Self {
        self.initial_backoff_ms = 0;
        self.max_backoff_ms = 0;
        self
    }

    /// Attempts actually made (never less than one)
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = Duration::from_millis(self.initial_backoff_ms);
        let delay = match self.backoff {
            BackoffType::Constant => initial,
            BackoffType::Linear => initial * (attempt + 1),
            BackoffType::Exponential => initial * 2u32.saturating_pow(attempt),
        };

        std::cmp::min(delay, Duration::from_millis(self.max_backoff_ms))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up
///
/// The closure receives the 0-based attempt number. Exhaustion is reported as
/// [`Error::RetriesExhausted`] carrying the last error.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{operation} succeeded on attempt {}", attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt + 1 >= attempts {
                    return Err(Error::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts,
                        last_error: Box::new(e),
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    "{operation} failed, attempt {}/{attempts}, retrying in {delay:?}: {e}",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
