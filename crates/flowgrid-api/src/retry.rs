// Retry policy for fallible async operations.
//
// One policy value is shared by every REST call and by bootstrap port
// discovery, replacing scattered sleep loops. Waits are cooperative
// (`tokio::time::sleep`), never thread-blocking.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Bounded-attempt retry with a fixed inter-attempt delay.
///
/// `max_attempts` counts total attempts (initial try + retries). The last
/// error is returned unchanged after exhaustion; callers decide whether
/// that means "use a default" (GETs) or "operation failed" (POSTs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    pub async fn run<T, E, Op, Fut>(&self, what: &str, mut op: Op) -> Result<T, E>
    where
        E: fmt::Display,
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1usize;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => {
                    warn!(
                        error = %err,
                        attempts = self.max_attempts,
                        "{what} failed; retries exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    debug!(
                        error = %err,
                        attempt,
                        max_attempts = self.max_attempts,
                        "{what} failed; retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(300),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result: Result<u32, String> = policy
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result: Result<u32, String> = policy
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("not yet".to_string())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_after_exhaustion() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result: Result<u32, String> = policy
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {n}")) }
            })
            .await;

        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        let result: Result<u32, String> = policy.run("op", || async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}
