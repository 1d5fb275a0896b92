//! Bounded exponential backoff for backend calls.

use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based): `min(base * 2^(retry-1), max)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or the attempt
    /// budget is spent.
    pub fn run<T, F>(&self, mut operation: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Result<T, BackendError>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.delay_for(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying backend call"
                    );
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, delay: Duration) {
            self.0.lock().unwrap().push(delay);
        }
    }

    fn connectivity() -> BackendError {
        BackendError::Connectivity {
            provider: "test".to_string(),
            message: "timed out".to_string(),
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.delay_for(1), Duration::from_secs(2));
        assert_eq!(cfg.delay_for(2), Duration::from_secs(4));
        assert_eq!(cfg.delay_for(3), Duration::from_secs(8));
        assert_eq!(cfg.delay_for(4), Duration::from_secs(10));
    }

    #[test]
    fn retries_connectivity_failures_up_to_budget() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RetryPolicy::default().with_sleeper(sleeper.clone());
        let mut calls = 0;
        let res: Result<(), _> = policy.run(|| {
            calls += 1;
            Err(connectivity())
        });
        assert!(res.is_err());
        assert_eq!(calls, 3);
        assert_eq!(
            *sleeper.0.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn does_not_retry_api_errors() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RetryPolicy::default().with_sleeper(sleeper.clone());
        let mut calls = 0;
        let res: Result<(), _> = policy.run(|| {
            calls += 1;
            Err(BackendError::Api {
                provider: "test".to_string(),
                status: 401,
                message: "bad key".to_string(),
            })
        });
        assert!(res.is_err());
        assert_eq!(calls, 1);
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[test]
    fn recovers_after_transient_failure() {
        let policy = RetryPolicy::default().with_sleeper(Arc::new(RecordingSleeper::default()));
        let mut calls = 0;
        let res = policy.run(|| {
            calls += 1;
            if calls < 2 { Err(connectivity()) } else { Ok(calls) }
        });
        assert_eq!(res.unwrap(), 2);
    }
}
