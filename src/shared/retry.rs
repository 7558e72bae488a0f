use std::future::Future;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::shared::error::MeetError;

/// Bounded exponential backoff with jitter, applied to upstream media
/// server calls and storage uploads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter fraction (0.0 to 1.0) added on top of the computed delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (1-based; attempt 1 has no delay).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(16);
        let base = self.base_delay.saturating_mul(1u32 << exp);
        let capped = base.min(self.max_delay);
        if self.jitter_factor <= 0.0 {
            return capped;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_factor);
        capped.mul_f64(1.0 + jitter)
    }
}

/// Runs `op` until it succeeds or the policy is exhausted, sleeping between
/// attempts. Returns the last error on exhaustion.
pub async fn retry<F, Fut, T>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, MeetError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MeetError>>,
{
    let mut last_err = MeetError::Upstream(format!("{label}: no attempts made"));
    for attempt in 1..=policy.max_attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!(
                    "{label} failed (attempt {attempt}/{}): {e}",
                    policy.max_attempts
                );
                last_err = e;
            }
        }
    }
    Err(last_err)
}
