//! Bounded retry with exponential backoff for transient gateway failures

use crate::gateway::GatewayError;
use crate::models::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Retry schedule: `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
///
/// A provider-supplied `retry_after` replaces the computed delay for that attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `call` receives the 1-based attempt number. Exhaustion is reported as
    /// [`GatewayError::RetriesExhausted`] wrapping the last failure.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, GatewayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    if max_attempts == 1 {
                        return Err(err);
                    }
                    tracing::error!(
                        operation = operation,
                        attempts = attempt,
                        error = %err,
                        "gateway call failed; retries exhausted"
                    );
                    return Err(GatewayError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.delay_for(attempt));
                    tracing::warn!(
                        operation = operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient gateway failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let attempts = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("send", |attempt| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(GatewayError::Transport("reset".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run("send", |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(GatewayError::Api {
                        status: 400,
                        description: "chat not found".into(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Api { status: 400, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = RetryPolicy::default()
            .run("edit", |_| async { Err(GatewayError::Transport("timeout".into())) })
            .await;
        match result {
            Err(GatewayError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(*last, GatewayError::Transport("timeout".into()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // 500ms + 1000ms of backoff between the three attempts
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_retry_after_overrides_backoff() {
        let start = tokio::time::Instant::now();
        let result = RetryPolicy::default()
            .run("send", |attempt| async move {
                if attempt == 1 {
                    Err(GatewayError::RateLimited {
                        retry_after: Duration::from_secs(4),
                    })
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(4));
    }
}
