use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Bounded retry with exponential backoff.
///
/// `attempts` counts the first try, so `RetryPolicy::new(3, 1s)` sleeps 1s
/// then 2s between three tries at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay slept before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }

    /// Runs `op` until it succeeds, fails with an error `is_transient`
    /// rejects, or the attempt budget is spent. The last error is returned.
    ///
    /// `op` receives the zero-based attempt index.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = self.delay_for(attempt);
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, "Retrying after backoff");
                tokio::time::sleep(backoff).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.attempts || !is_transient(&e) {
                        return Err(e);
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
