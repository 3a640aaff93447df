//! Bounded exponential backoff for transient upstream failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reelpipe_common::Result;

/// How often and how patiently to retry a failed fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay, before jitter.
    pub max_delay: Duration,
    /// Jitter factor (0.0-1.0); each delay varies by up to this fraction.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exp = 2_f64.powi(attempt.saturating_sub(1).min(30) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        let jitter_range = delay_ms * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    ///
    /// Only errors for which [`reelpipe_common::Error::is_transient`] holds are
    /// retried.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && self.should_retry(attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        op = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelpipe_common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn exponential_delays_are_capped() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(50), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.delay_for_attempt(2).as_millis();
            assert!((800..=1200).contains(&d), "delay {d} out of range");
        }
    }

    #[test]
    fn should_retry_counts_total_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(2));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("test", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(Error::rejected(Some(503), "busy"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(1), Duration::from_millis(2));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::rejected(Some(404), "missing")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::exponential(2, Duration::from_millis(1), Duration::from_millis(2));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::UpstreamUnavailable("refused".into())) }
            })
            .await;

        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
