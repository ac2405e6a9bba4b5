//! Bounded retry for remote statements
//!
//! The data API fails transiently in two ways we can recover from: the statement
//! times out, or a client-generated id collides with an existing row. Both are
//! retried after a fixed delay; every other failure is returned immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{OrmError, OrmResult};

/// Default number of attempts, including the first one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// How many times to run an operation and which failures justify another attempt
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts allowed, always at least 1
    pub max_attempts: u32,
    /// Pause before each repeated attempt
    pub retry_delay: Duration,
    is_retryable: fn(&OrmError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            is_retryable: OrmError::is_retryable,
        }
    }

    /// Replace the error classifier
    pub fn with_classifier(mut self, is_retryable: fn(&OrmError) -> bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }

    pub fn is_retryable(&self, error: &OrmError) -> bool {
        (self.is_retryable)(error)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Runs operations under a fixed [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempt budget is spent
    pub async fn run<T, F, Fut>(&self, operation: F) -> OrmResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        run_with_retry(&self.policy, operation).await
    }
}

/// Run `operation` under `policy`.
///
/// The operation is invoked again only after a retryable failure, never
/// concurrently. When the final allowed attempt fails retryably the result is
/// [`OrmError::ExhaustedRetries`] wrapping that last failure.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> OrmResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OrmResult<T>>,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempts > 0 {
                    debug!(attempts = attempts + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if policy.is_retryable(&error) => {
                attempts += 1;

                if attempts >= policy.max_attempts {
                    warn!(attempts, error = %error, "Giving up on retryable database error");
                    return Err(OrmError::ExhaustedRetries {
                        attempts,
                        last_error: Box::new(error),
                    });
                }

                warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms = policy.retry_delay.as_millis() as u64,
                    error = %error,
                    "Retryable database error, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
