//! Bounded exponential-backoff retry, shared by the Runner, Pool Processor,
//! Emergency Override and Error-Recovery Manager.
//!
//! Grounded on the teacher pack's sidecar retry executor
//! (`examples/seanchatmangpt-knhk/rust/knhk-sidecar/src/retry.rs`).

use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Runner context: base 1s, cap 30s, at most 3 attempts (spec §4.7).
    pub const RUNNER: RetryConfig = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1_000,
        max_delay_ms: 30_000,
    };

    /// Emergency Override context: up to 5 retries per entry (spec §4.11).
    pub const EMERGENCY: RetryConfig = RetryConfig {
        max_attempts: 5,
        base_delay_ms: 1_000,
        max_delay_ms: 30_000,
    };

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ms = (self.base_delay_ms).saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Executes `f` with bounded exponential backoff. `is_retryable` decides
/// whether a given error should be retried at all; non-retryable errors
/// return immediately.
pub async fn with_retry<F, Fut, T, E>(
    config: RetryConfig,
    mut is_retryable: impl FnMut(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 >= config.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }
                sleep(config.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            |_: &&str| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, &str> = with_retry(
            RetryConfig::RUNNER,
            |_| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
