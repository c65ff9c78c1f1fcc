use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tabrelay_core::RetrySettings;
use tabrelay_logging::{relay_error, relay_warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Seconds.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 1.0,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff_factor: settings.backoff_factor,
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (0-based): `backoff_factor * 2^attempt` seconds.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor * 2f64.powi(attempt.min(62) as i32);
        if !secs.is_finite() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    with_retry_if(policy, op, |_| true).await
}

/// Like [`with_retry`], but errors for which `retryable` is false are returned at once.
pub async fn with_retry_if<T, E, F, Fut, P>(policy: RetryPolicy, mut op: F, retryable: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !retryable(&err) => return Err(err),
            Err(err) if attempt + 1 >= attempts => {
                relay_error!("All {attempts} attempts failed: {err}");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                relay_warn!(
                    "Attempt {}/{attempts} failed: {err}. Retrying in {delay:?}",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
