//! Bounded retry with a fixed delay between attempts.
//!
//! Catalog panels render asynchronously, so "is the close button there yet"
//! is polled a few times, and closing a panel is retried until the control
//! is gone.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::trace;

/// Retry configuration: attempt budget plus the pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts (at least one is always made).
    pub max_attempts: u32,
    /// Pause after each unsuccessful attempt.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(500))
    }
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `probe` until it returns `true` or attempts run out.
    ///
    /// Returns whether the probe ever succeeded. No delay follows the final attempt.
    pub async fn poll<F, Fut>(&self, mut probe: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let attempts = self.attempts();
        for attempt in 1..=attempts {
            if probe().await {
                return true;
            }
            trace!(attempt, max_attempts = attempts, "probe not satisfied");
            if attempt < attempts {
                sleep(self.delay).await;
            }
        }
        false
    }

    /// Run `op` until it returns `Ok`, returning the last error otherwise.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    trace!(attempt, max_attempts = attempts, error = %e, "attempt failed");
                    sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const FAST: RetryPolicy = RetryPolicy::fixed(3, Duration::ZERO);

    #[tokio::test]
    async fn poll_stops_on_first_success() {
        let calls = Cell::new(0);
        let ok = FAST
            .poll(|| {
                calls.set(calls.get() + 1);
                let done = calls.get() == 2;
                async move { done }
            })
            .await;
        assert!(ok);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn poll_is_bounded() {
        let calls = Cell::new(0);
        let ok = FAST
            .poll(|| {
                calls.set(calls.get() + 1);
                async { false }
            })
            .await;
        assert!(!ok);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn retry_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), String> = FAST
            .retry(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err(format!("failure {n}")) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "failure 3");
    }

    #[tokio::test]
    async fn retry_returns_first_ok() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = FAST
            .retry(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { if n == 1 { Err("flaky".to_string()) } else { Ok(n) } }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = Cell::new(0);
        RetryPolicy::fixed(0, Duration::ZERO)
            .poll(|| {
                calls.set(calls.get() + 1);
                async { false }
            })
            .await;
        assert_eq!(calls.get(), 1);
    }
}
