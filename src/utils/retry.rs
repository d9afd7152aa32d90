use std::future::Future;
use std::time::Duration;

use tokio_retry::RetryIf;
use tracing::{error, warn};

use crate::utils::error::{AppError, Result};

/// Exponential backoff settings for a fallible network operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`. `attempt` starts at 0.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        let policy = *self;
        (0..policy.max_retries).map(move |attempt| policy.delay_for(attempt))
    }
}

/// Run `operation`, retrying transient failures according to `policy`.
///
/// Non-transient errors are returned after the first call. When every retry
/// fails the last error is returned.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0u32;

    let result = RetryIf::spawn(policy.delays(), operation, |err: &AppError| {
        if !err.is_transient() {
            return false;
        }
        if retries < policy.max_retries {
            let delay = policy.delay_for(retries);
            retries += 1;
            warn!(
                target: "retry",
                "{} failed (retry {}/{} in {:?}): {}",
                label, retries, policy.max_retries, delay, err
            );
        }
        true
    })
    .await;

    if let Err(err) = &result {
        if err.is_transient() {
            error!(target: "retry", "{} gave up after {} retries: {}", label, retries, err);
        }
    }

    result
}
