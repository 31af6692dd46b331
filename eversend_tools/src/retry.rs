use std::{future::Future, time::Duration};

use log::*;
use rand::Rng;

use crate::EversendApiError;

/// Explicit retry policy for outbound provider calls: exponential backoff with jitter, bounded attempts, bounded
/// per-attempt delay. Only transient failures (see [`EversendApiError::is_transient`]) are retried; once the
/// attempt budget is spent the failure surfaces as [`EversendApiError::UpstreamUnavailable`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// The delay to sleep after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.max_delay.as_millis() as f64) as u64;
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..=jitter_ms) };
        Duration::from_millis(capped + jitter)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or exhausts the attempt budget.
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, EversendApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, EversendApiError>>,
    {
        let mut attempt = 1u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!("{label}: attempt {attempt}/{} failed ({e}). Retrying in {delay:?}", self.max_attempts);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) if e.is_transient() => {
                    warn!("{label}: giving up after {attempt} attempts. {e}");
                    return Err(EversendApiError::UpstreamUnavailable(format!(
                        "{label} failed after {attempt} attempts: {e}"
                    )));
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_base_delay(Duration::from_millis(1)).with_jitter(Duration::ZERO)
    }

    fn transient() -> EversendApiError {
        EversendApiError::QueryError { status: 503, message: "overloaded".to_string() }
    }

    #[tokio::test]
    async fn two_transient_failures_then_success_takes_three_attempts() {
        let calls = AtomicU32::new(0);
        let result = fast_policy()
            .run("test", |_| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_transient_failure_exhausts_the_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy()
            .run("test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;
        assert!(matches!(result.unwrap_err(), EversendApiError::UpstreamUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy()
            .run("test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EversendApiError::QueryError { status: 400, message: "bad request".to_string() })
            })
            .await;
        assert!(matches!(result.unwrap_err(), EversendApiError::QueryError { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delays_grow_exponentially_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(450),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(450));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 1.0,
            max_delay: Duration::from_secs(1),
            jitter: Duration::from_millis(50),
        };
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
