//! Fixed window counters over a pluggable store

use super::{Admission, AdmissionGate, RateBackend, RateLimits, MAX_RATE_PERIOD};
use crate::error::MediaError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Extra lifetime of a counter past its window
const EXPIRY_GRACE: Duration = Duration::from_secs(2);

/// Longest lifetime a counter is kept
const MAX_COUNTER_TTL: Duration = Duration::from_secs(MAX_RATE_PERIOD.as_secs() + EXPIRY_GRACE.as_secs());

/// Shared counters; the seam for an out-of-process store
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, creating it with `ttl` if absent, and return the new value
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, MediaError>;

    /// Current value of `key`
    async fn get(&self, key: &str) -> Result<u64, MediaError>;
}

struct Counter {
    value: AtomicU64,
    ttl: Duration,
}

struct CounterExpiry;

impl Expiry<String, Arc<Counter>> for CounterExpiry {
    fn expire_after_create(&self, _key: &String, counter: &Arc<Counter>, _created_at: Instant) -> Option<Duration> {
        Some(counter.ttl)
    }
}

/// In-process [`CounterStore`] on a moka cache with per-entry expiry
#[derive(Clone)]
pub struct MemoryCounterStore {
    counters: Cache<String, Arc<Counter>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: Cache::builder()
                .max_capacity(100_000)
                .expire_after(CounterExpiry)
                .build(),
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, MediaError> {
        let counter = self
            .counters
            .get_with(key.to_string(), async move {
                Arc::new(Counter {
                    value: AtomicU64::new(0),
                    ttl: ttl.min(MAX_COUNTER_TTL),
                })
            })
            .await;
        Ok(counter.value.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn get(&self, key: &str) -> Result<u64, MediaError> {
        Ok(self
            .counters
            .get(key)
            .await
            .map_or(0, |counter| counter.value.load(Ordering::SeqCst)))
    }
}

/// Wall clock used to place calls into windows
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Counts admissions per `(key, floor(now / period))`.
///
/// Cheaper than a sliding window and shareable through the store, but a client
/// can be admitted up to `2 * limit` times across a window boundary. A store
/// failure admits the call.
pub struct FixedWindowLimiter {
    store: Arc<dyn CounterStore>,
    limits: RwLock<RateLimits>,
    clock: Clock,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>, limits: RateLimits) -> Self {
        Self::with_clock(store, limits, Arc::new(Utc::now))
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, limits: RateLimits, clock: Clock) -> Self {
        Self {
            store,
            limits: RwLock::new(limits),
            clock,
        }
    }

    /// Store key and time left for the window containing `now`
    fn window(&self, key: &str, now: DateTime<Utc>, period: Duration) -> (String, Duration) {
        let period_ms = i64::try_from(period.as_millis()).unwrap_or(i64::MAX).max(1);
        let now_ms = now.timestamp_millis();
        let index = now_ms.div_euclid(period_ms);
        let remaining = index
            .saturating_add(1)
            .saturating_mul(period_ms)
            .saturating_sub(now_ms);
        (
            format!("rl:{}:{}", key, index),
            Duration::from_millis(remaining.max(0) as u64),
        )
    }
}

#[async_trait]
impl AdmissionGate for FixedWindowLimiter {
    async fn admit(&self, key: &str) -> Admission {
        let RateLimits { limit, period } = self.limits();
        let (window_key, remaining) = self.window(key, (self.clock)(), period);

        match self.store.incr(&window_key, period.saturating_add(EXPIRY_GRACE)).await {
            Ok(count) if count <= u64::from(limit) => Admission::Allowed,
            Ok(count) => {
                debug!("{} reached {} calls in its window", key, count);
                Admission::Denied {
                    retry_after: remaining,
                }
            }
            Err(e) => {
                warn!("Rate limit store unavailable, admitting {}: {}", key, e);
                Admission::Allowed
            }
        }
    }

    fn limits(&self) -> RateLimits {
        *self.limits.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_limits(&self, limits: RateLimits) {
        *self.limits.write().unwrap_or_else(PoisonError::into_inner) = limits;
    }

    fn backend(&self) -> RateBackend {
        RateBackend::Fixed
    }
}
