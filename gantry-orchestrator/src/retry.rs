//! Bounded retry for persistence I/O
//!
//! The embedded store can transiently lock under concurrent writers; every
//! persistence write goes through a policy with a bounded attempt count.
//! Pipeline bodies are never retried through this path.

use std::time::Duration;

/// Injectable retry policy: attempt bound, base delay, backoff factor.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
            backoff: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy (backoff factor 1).
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: 1.0,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.delay.mul_f64(self.backoff.powi(attempt as i32))
    }

    /// Runs `op` until it succeeds or the attempt bound is reached.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    tracing::warn!(
                        "transient store error (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        self.max_attempts,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
