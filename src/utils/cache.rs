//! Caching utilities for mediafetch

use crate::core::media::MediaInfo;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of a cached metadata entry
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(300);

/// High-performance async cache using moka
pub type AsyncCache<K, V> = Cache<K, V>;

/// Create a new async cache with TTL and max capacity
pub fn new_async_cache_with_capacity<K, V>(ttl: Duration, max_capacity: u64) -> AsyncCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .time_to_live(ttl)
        .max_capacity(max_capacity)
        .build()
}

/// Resolved metadata keyed by source URL
#[derive(Clone)]
pub struct MetadataCache {
    inner: AsyncCache<String, Arc<MediaInfo>>,
}

impl MetadataCache {
    /// Create a cache holding up to `max_capacity` entries for `ttl`
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: new_async_cache_with_capacity(ttl, max_capacity),
        }
    }

    pub async fn get(&self, url: &str) -> Option<Arc<MediaInfo>> {
        self.inner.get(url).await
    }

    pub async fn insert(&self, url: &str, info: Arc<MediaInfo>) {
        self.inner.insert(url.to_string(), info).await;
    }

    pub async fn invalidate(&self, url: &str) {
        self.inner.invalidate(url).await;
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_TTL, 1_000)
    }
}
