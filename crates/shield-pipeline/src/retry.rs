//! Per-stage retry executor with exponential or linear backoff (spec.md
//! §4.2's retry table). Grounded on `knhk-sidecar::retry::RetryExecutor`,
//! generalized to carry a distinct `RetryPolicy` per stage instead of one
//! process-wide config.

use std::time::Duration;

use tokio::time::sleep;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Exponential,
    Linear,
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, initial_delay_secs: u64, backoff: Backoff) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(initial_delay_secs),
            backoff,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.initial_delay * (attempt + 1),
            Backoff::Exponential => self.initial_delay * 2u32.pow(attempt),
        }
    }
}

/// Whether a stage error is worth retrying. Input-validation failures are
/// terminal (spec.md §4.2: "Retries occur only on transient failures;
/// input-validation failures are terminal").
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Run `f` under `policy`, sleeping between attempts. Returns the last
/// error once retries are exhausted or the error is non-retryable.
pub async fn run_with_retry<F, Fut, T, E>(policy: RetryPolicy, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if !e.is_retryable() || attempt >= policy.max_retries => return Err(e),
            Err(_) => {
                sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);
    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures_within_budget() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 1, Backoff::Linear);
        let result: Result<&str, Flaky> = run_with_retry(policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(Flaky(true)) } else { Ok("done") } }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_and_returns_last_error() {
        let policy = RetryPolicy::new(2, 1, Backoff::Exponential);
        let result: Result<(), Flaky> = run_with_retry(policy, || async { Err(Flaky(true)) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_retryable_error_short_circuits_immediately() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, 1, Backoff::Linear);
        let result: Result<(), Flaky> = run_with_retry(policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
