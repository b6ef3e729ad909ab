//! Read-through cache for the serialized plan listing, backed by `moka`.
//!
//! No stampede protection: concurrent misses all fall through to the store.
//! Every invalidation bumps a generation counter; a fill computed under an
//! older generation is dropped so it cannot resurrect pre-write data.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;

/// Key under which the full plan listing is cached.
pub const ALL_PLANS_KEY: &str = "all_plans";

/// String-valued TTL cache.
#[derive(Debug, Clone)]
pub struct PlanCache {
    inner: Cache<String, Arc<str>>,
    generation: Arc<AtomicU64>,
}

impl PlanCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(64).time_to_live(ttl).build(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        self.inner.get(key).await
    }

    pub async fn put(&self, key: &str, value: String) {
        self.inner.insert(key.to_string(), Arc::from(value)).await;
    }

    /// Current generation; capture it before reading the value to cache.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Insert `value` unless an invalidation happened since `generation` was
    /// captured. Returns whether the value stayed cached.
    pub async fn put_if_current(&self, key: &str, value: String, generation: u64) -> bool {
        if self.generation() != generation {
            return false;
        }
        self.put(key, value).await;
        // An invalidation between the check and the insert still wins.
        if self.generation() != generation {
            self.inner.invalidate(key).await;
            return false;
        }
        true
    }

    pub async fn invalidate(&self, key: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.invalidate(key).await;
    }
}
