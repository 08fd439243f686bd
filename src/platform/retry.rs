//! Retry policy for transport requests

use crate::error::TubeError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff settings
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based), capped and jittered
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let base = base.min(self.max_delay.as_millis() as f64);

        let jitter = if self.jitter_factor > 0.0 {
            (rand::random::<f64>() - 0.5) * 2.0 * base * self.jitter_factor
        } else {
            0.0
        };

        Duration::from_millis((base + jitter).max(0.0) as u64)
    }
}

/// Runs a request again while it fails with a retryable error
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<F, Fut, T>(&self, mut request: F) -> Result<T, TubeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TubeError>>,
    {
        let mut attempt = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt);
                    debug!(
                        "Request failed ({}), retry {}/{} in {:?}",
                        error,
                        attempt + 1,
                        self.config.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn unavailable() -> TubeError {
        TubeError::HttpStatus {
            status: 503,
            url: "https://example.com".to_string(),
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(max_retries)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter_factor(0.0)
    }

    #[test]
    fn test_delay_for_backoff_and_cap() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(250));
    }

    #[test]
    fn test_jitter_clamping() {
        assert_eq!(RetryConfig::default().with_jitter_factor(1.5).jitter_factor, 1.0);
        assert_eq!(RetryConfig::default().with_jitter_factor(-0.5).jitter_factor, 0.0);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let executor = RetryExecutor::with_config(fast_config(3));
        let counter = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(unavailable())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let executor = RetryExecutor::with_config(fast_config(2));
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), TubeError> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(unavailable())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let executor = RetryExecutor::with_config(fast_config(3));
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), TubeError> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TubeError::NotConnected)
                }
            })
            .await;

        assert!(matches!(result, Err(TubeError::NotConnected)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
