use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Bounded Retry with Exponential Backoff
// ============================================================================
//
// Shared retry policy for calls that cross a network boundary: the broker
// publish path and the shipping gateway. Retries are always bounded; the
// last error is returned to the caller once the attempt budget is spent.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Worst-case wall-clock time spent sleeping between attempts.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}

/// Run `operation` until it succeeds or the attempt budget is exhausted.
///
/// The closure receives the 1-based attempt number. On exhaustion the error
/// from the final attempt is returned.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if attempt >= config.max_attempts => {
                tracing::error!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %error,
                    "Operation failed after all retry attempts"
                );
                return Err(error);
            }
            Err(error) => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %error,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying after backoff"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let config = quick_config(5);
        assert_eq!(config.delay_for(1), Duration::from_millis(5));
        assert_eq!(config.delay_for(2), Duration::from_millis(10));
        assert_eq!(config.delay_for(3), Duration::from_millis(20));
        // 5 * 2^4 = 80ms, capped at 50ms
        assert_eq!(config.delay_for(5), Duration::from_millis(50));
    }

    #[test]
    fn total_backoff_sums_inter_attempt_delays() {
        let config = quick_config(3);
        // 5ms after attempt 1 + 10ms after attempt 2
        assert_eq!(config.total_backoff(), Duration::from_millis(15));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&quick_config(3), "test_op", |_attempt| {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("temporary failure")
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_after_budget_exhausted() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), String> =
            retry_with_backoff(&quick_config(2), "test_op", |attempt| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure on attempt {attempt}")) }
            })
            .await;

        assert_eq!(result, Err("failure on attempt 2".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
