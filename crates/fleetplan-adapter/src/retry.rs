//! Bounded exponential backoff for read operations.
//!
//! Only reads go through here. Writes are never retried: an unconfirmed
//! write retried blindly risks double application, so a failed write is
//! surfaced to the caller instead.

use fleetplan_core::error::FleetError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (attempt numbering starts at 1), with
    /// jitter of up to half the computed delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter_cap = backoff.as_millis() as u64 / 2;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// Runs a read operation with transparent retries on retryable failures.
/// Non-retryable failures (auth, rejection, policy) surface immediately.
pub async fn retry_read<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, FleetError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FleetError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, code = %err.code, "read retry");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
