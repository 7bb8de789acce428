use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::Result;

/// Parameterized retry for transient failures: bounded attempts,
/// exponential backoff, jitter.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`,
    /// capped at `max_delay`, plus up to 50% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        capped + jitter(capped / 2)
    }
}

/// Jitter in `[0, upper)` derived from the wall clock.
fn jitter(upper: Duration) -> Duration {
    let nanos = upper.as_nanos();
    if nanos == 0 {
        return Duration::ZERO;
    }
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    Duration::from_nanos((u128::from(seed) % nanos) as u64)
}

/// Run `op`, retrying transient failures per `policy`. Non-transient errors
/// and exhaustion propagate to the caller.
pub async fn with_backoff<T, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> Fut,
) -> Result<T>
where
    Fut: std::future::IntoFuture<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    "{what} failed (attempt {}/{}), retrying in {delay:?}: {e}",
                    attempt + 1,
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
