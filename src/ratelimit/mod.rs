//! Keyed admission control

pub mod fixed;
pub mod sliding;

pub use fixed::*;
pub use sliding::*;

use crate::error::MediaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Longest accepted rate period
pub const MAX_RATE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Admissions allowed per period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub limit: u32,
    pub period: Duration,
}

impl RateLimits {
    pub fn new(limit: u32, period: Duration) -> Result<Self, MediaError> {
        if limit == 0 {
            return Err(MediaError::InvalidInput("Rate limit must be at least 1".to_string()));
        }
        if period.is_zero() {
            return Err(MediaError::InvalidInput("Rate period must be positive".to_string()));
        }
        if period > MAX_RATE_PERIOD {
            return Err(MediaError::InvalidInput(format!(
                "Rate period must be at most {}s",
                MAX_RATE_PERIOD.as_secs()
            )));
        }
        Ok(Self { limit, period })
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            limit: 10,
            period: Duration::from_secs(60),
        }
    }
}

/// Decision for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Accounting strategy behind an [`AdmissionGate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateBackend {
    Sliding,
    Fixed,
}

impl FromStr for RateBackend {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sliding" | "memory" => Ok(RateBackend::Sliding),
            "fixed" | "window" => Ok(RateBackend::Fixed),
            other => Err(MediaError::InvalidInput(format!(
                "Unknown rate limit backend '{}', expected sliding or fixed",
                other
            ))),
        }
    }
}

impl fmt::Display for RateBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateBackend::Sliding => f.write_str("sliding"),
            RateBackend::Fixed => f.write_str("fixed"),
        }
    }
}

/// Admission gate keyed by client identity
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    async fn admit(&self, key: &str) -> Admission;

    fn limits(&self) -> RateLimits;

    /// Change thresholds; existing windows are judged by the new values
    fn set_limits(&self, limits: RateLimits);

    fn backend(&self) -> RateBackend;

    /// Forget keys with no admissions in the trailing period
    fn purge_idle(&self) {}
}

/// Build the configured backend; the fixed window runs over an in-process store
pub fn build_rate_limiter(backend: RateBackend, limits: RateLimits) -> Arc<dyn AdmissionGate> {
    match backend {
        RateBackend::Sliding => Arc::new(SlidingWindowLimiter::new(limits)),
        RateBackend::Fixed => Arc::new(FixedWindowLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            limits,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limits_validation() {
        assert!(RateLimits::new(0, Duration::from_secs(1)).is_err());
        assert!(RateLimits::new(1, Duration::ZERO).is_err());
        assert_eq!(RateLimits::default().limit, 10);
        assert!(RateLimits::new(1, MAX_RATE_PERIOD).is_ok());
        assert!(RateLimits::new(1, MAX_RATE_PERIOD + Duration::from_secs(1)).is_err());
        assert!(RateLimits::new(1, Duration::from_secs(u64::MAX)).is_err());
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("sliding".parse::<RateBackend>().unwrap(), RateBackend::Sliding);
        assert_eq!(" Fixed ".parse::<RateBackend>().unwrap(), RateBackend::Fixed);
        assert!("redis".parse::<RateBackend>().is_err());
    }

    #[tokio::test]
    async fn test_backends_agree_within_one_window() {
        let limits = RateLimits::new(3, Duration::from_secs(3600)).unwrap();
        for backend in [RateBackend::Sliding, RateBackend::Fixed] {
            let gate = build_rate_limiter(backend, limits);
            assert_eq!(gate.backend(), backend);
            let mut decisions = Vec::new();
            for _ in 0..5 {
                decisions.push(gate.admit("client").await.is_allowed());
            }
            assert_eq!(decisions, vec![true, true, true, false, false], "{}", backend);
        }
    }
}
