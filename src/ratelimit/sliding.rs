//! In-process sliding window

use super::{Admission, AdmissionGate, RateBackend, RateLimits};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// Keeps the admission instants of the trailing period per key
pub struct SlidingWindowLimiter {
    limits: RwLock<RateLimits>,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits: RwLock::new(limits),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admissions currently counted for `key`
    pub fn tracked(&self, key: &str) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, VecDeque::len)
    }
}

fn evict(window: &mut VecDeque<Instant>, now: Instant, period: std::time::Duration) {
    while let Some(oldest) = window.front() {
        if now.duration_since(*oldest) > period {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl AdmissionGate for SlidingWindowLimiter {
    async fn admit(&self, key: &str) -> Admission {
        let RateLimits { limit, period } = self.limits();
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(key.to_string()).or_default();

        evict(window, now, period);

        if window.len() < limit as usize {
            window.push_back(now);
            return Admission::Allowed;
        }

        let retry_after = window
            .front()
            .map(|oldest| period.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(period);
        debug!("Rate limit reached for {}; retry in {:?}", key, retry_after);
        Admission::Denied { retry_after }
    }

    fn limits(&self) -> RateLimits {
        *self.limits.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_limits(&self, limits: RateLimits) {
        *self.limits.write().unwrap_or_else(PoisonError::into_inner) = limits;
    }

    fn backend(&self) -> RateBackend {
        RateBackend::Sliding
    }

    fn purge_idle(&self) {
        let period = self.limits().period;
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, window| {
            evict(window, now, period);
            !window.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn limiter(limit: u32, secs: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(RateLimits::new(limit, Duration::from_secs(secs)).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_per_three_seconds() {
        let limiter = limiter(2, 3);

        assert!(limiter.admit("k").await.is_allowed());
        assert!(limiter.admit("k").await.is_allowed());
        match limiter.admit("k").await {
            Admission::Denied { retry_after } => assert!(retry_after <= Duration::from_secs(3)),
            Admission::Allowed => panic!("third call should be denied"),
        }

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert!(limiter.admit("k").await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_min_of_n_and_limit() {
        for n in [1usize, 4, 5, 9] {
            let limiter = limiter(5, 60);
            let mut admitted = 0;
            for _ in 0..n {
                if limiter.admit("client").await.is_allowed() {
                    admitted += 1;
                }
            }
            assert_eq!(admitted, n.min(5));
            assert_eq!(limiter.tracked("client"), n.min(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = limiter(1, 60);
        assert!(limiter.admit("a").await.is_allowed());
        assert!(!limiter.admit("a").await.is_allowed());
        assert!(limiter.admit("b").await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limits_change_at_runtime() {
        let limiter = limiter(1, 60);
        assert!(limiter.admit("k").await.is_allowed());
        assert!(!limiter.admit("k").await.is_allowed());

        limiter.set_limits(RateLimits::new(3, Duration::from_secs(60)).unwrap());
        assert!(limiter.admit("k").await.is_allowed());
        assert_eq!(limiter.limits().limit, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_idle() {
        let limiter = limiter(2, 1);
        limiter.admit("k").await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        limiter.purge_idle();
        assert_eq!(limiter.tracked("k"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(limiter(10, 60));
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit("shared").await.is_allowed() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
