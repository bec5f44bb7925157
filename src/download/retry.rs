//! Retry logic for transport attempts

use crate::error::MediaError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base + attempt * increment`
    Linear { increment: Duration },
    /// `base * multiplier^attempt`
    Exponential { multiplier: f64 },
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    pub backoff: Backoff,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Linear {
                increment: Duration::from_secs(1),
            },
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay after the failed zero-based `attempt`, before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Linear { increment } => {
                self.base_delay.saturating_add(increment.saturating_mul(attempt))
            }
            Backoff::Exponential { multiplier } => {
                let factor = multiplier.max(1.0).powi(attempt.min(64) as i32);
                Duration::from_secs_f64((self.base_delay.as_secs_f64() * factor).min(u32::MAX as f64))
            }
        };
        delay.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        delay + Duration::from_millis(jitter as u64)
    }
}

/// Runs an operation until it succeeds, fails fatally or runs out of attempts
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with default configuration
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default())
    }

    /// Create a new retry executor with configuration
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Retry transient failures as classified by [`MediaError::is_retryable`].
    ///
    /// The operation receives the zero-based attempt index.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T, MediaError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, MediaError>>,
    {
        self.execute_with_classifier(op, MediaError::is_retryable)
            .await
    }

    /// Retry failures for which `classify` returns true; anything else aborts at once
    pub async fn execute_with_classifier<F, Fut, T, C>(
        &self,
        mut op: F,
        classify: C,
    ) -> Result<T, MediaError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, MediaError>>,
        C: Fn(&MediaError) -> bool,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !classify(&error) {
                        debug!("Attempt {} failed with fatal error: {}", attempt + 1, error);
                        return Err(error);
                    }
                    if attempt + 1 >= max_attempts {
                        warn!("Giving up after {} attempts: {}", max_attempts, error);
                        return Err(error);
                    }

                    let delay = self.config.jittered(self.config.delay_for(attempt));
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt + 1,
                        max_attempts,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Retry configuration builder
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Create a new retry configuration builder
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }

    /// Set total attempts
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay after the first failure
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.config.base_delay = base_delay;
        self
    }

    /// Grow delays linearly
    pub fn linear(mut self, increment: Duration) -> Self {
        self.config.backoff = Backoff::Linear { increment };
        self
    }

    /// Grow delays exponentially
    pub fn exponential(mut self, multiplier: f64) -> Self {
        self.config.backoff = Backoff::Exponential { multiplier };
        self
    }

    /// Set maximum delay
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.max_delay = max_delay;
        self
    }

    /// Set jitter factor
    pub fn jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.config.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Build the retry configuration
    pub fn build(self) -> RetryConfig {
        self.config
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
