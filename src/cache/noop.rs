use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::CacheStats;

use super::{Cache, ComputeFn};

/// Reports a miss for every `get` and never retains a `set`. Selected when
/// `cache.enabled = false`; every call falls through to recomputation.
#[derive(Default)]
pub struct NoopCache {
    misses: Mutex<u64>,
}

#[async_trait]
impl Cache for NoopCache {
    async fn get(&self, _key: &str) -> Option<serde_json::Value> {
        *self.misses.lock().await += 1;
        None
    }

    async fn set(&self, _key: &str, _value: serde_json::Value, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}

    async fn clear(&self) {}

    async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: 0,
            misses: *self.misses.lock().await,
            evictions: 0,
            size: 0,
        }
    }

    async fn get_or_compute(&self, _key: &str, _ttl: Duration, compute: ComputeFn) -> Result<serde_json::Value> {
        compute().await
    }
}
