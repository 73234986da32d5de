use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::models::CacheStats;

use super::{Cache, ComputeFn};

struct Entry {
    value: serde_json::Value,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    size_bytes: u64,
}

impl Entry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) <= self.ttl
    }
}

/// A single in-process TTL + LRU store. Used as the L1 tier, and optionally
/// as an L2 "distributed" stand-in (this crate has no distributed cache
/// dependency, so L2 is modeled as a second, longer-TTL in-process tier —
/// the contract's tier-inclusion and TTL-ordering rules still hold).
struct MemoryTier {
    entries: AsyncMutex<HashMap<String, Entry>>,
    max_entries: usize,
    max_memory_bytes: u64,
    stats: AsyncMutex<CacheStats>,
}

impl MemoryTier {
    fn new(max_entries: usize, max_memory_bytes: u64) -> Self {
        MemoryTier {
            entries: AsyncMutex::new(HashMap::new()),
            max_entries,
            max_memory_bytes,
            stats: AsyncMutex::new(CacheStats::default()),
        }
    }

    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut stats = self.stats.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            if entry.is_fresh(now) {
                entry.access_count += 1;
                stats.hits += 1;
                return Some(entry.value.clone());
            } else {
                entries.remove(key);
            }
        }
        stats.misses += 1;
        None
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let size_bytes = serde_json::to_vec(&value).map(|v| v.len() as u64).unwrap_or(0);
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: now,
                ttl,
                access_count: 0,
                size_bytes,
            },
        );
        let evictions = Self::evict_if_needed(&mut entries, self.max_entries, self.max_memory_bytes);
        let size = entries.len() as u64;
        drop(entries);
        let mut stats = self.stats.lock().await;
        stats.size = size;
        stats.evictions += evictions;
    }

    fn evict_if_needed(
        entries: &mut HashMap<String, Entry>,
        max_entries: usize,
        max_memory_bytes: u64,
    ) -> u64 {
        let mut evictions = 0u64;
        loop {
            let total_memory: u64 = entries.values().map(|e| e.size_bytes).sum();
            let over_count = entries.len() > max_entries.max(1);
            let over_memory = max_memory_bytes > 0 && total_memory > max_memory_bytes;
            if !over_count && !over_memory {
                break;
            }
            let victim = entries
                .iter()
                .min_by(|(_, a), (_, b)| {
                    a.access_count
                        .cmp(&b.access_count)
                        .then_with(|| a.created_at.cmp(&b.created_at))
                })
                .map(|(k, _)| k.clone());
            match victim {
                Some(k) => {
                    entries.remove(&k);
                    evictions += 1;
                }
                None => break,
            }
        }
        evictions
    }

    async fn delete(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    async fn clear(&self) {
        self.entries.lock().await.clear();
        *self.stats.lock().await = CacheStats::default();
    }

    async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }

    async fn sweep_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh(now));
        let removed = (before - entries.len()) as u64;
        let size = entries.len() as u64;
        drop(entries);
        if removed > 0 {
            let mut stats = self.stats.lock().await;
            stats.evictions += removed;
            stats.size = size;
        }
    }
}

/// Composes an L1 (small, hot, short TTL) and an optional L2 (larger,
/// longer TTL) memory tier with per-key single-flight coordination on top.
pub struct TieredCache {
    l1: MemoryTier,
    l2: Option<MemoryTier>,
    key_locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TieredCache {
    /// Pass `None` for `l2_max_entries` to run L1-only.
    pub fn new(l1_max_entries: usize, l1_max_memory_bytes: u64, l2_max_entries: Option<usize>) -> Self {
        TieredCache {
            l1: MemoryTier::new(l1_max_entries, l1_max_memory_bytes),
            l2: l2_max_entries.map(|n| MemoryTier::new(n, 0)),
            key_locks: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl Cache for TieredCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(v) = self.l1.get(key).await {
            return Some(v);
        }
        if let Some(l2) = &self.l2 {
            if let Some(v) = l2.get(key).await {
                // Promote the L2 hit back into L1, per the inclusion rule
                // (a value promoted from Lk to L(k-1) keeps a TTL no
                // longer than L1's own horizon).
                self.l1.set(key, v.clone(), Duration::from_secs(60)).await;
                return Some(v);
            }
        }
        None
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.l1.set(key, value.clone(), ttl).await;
        if let Some(l2) = &self.l2 {
            l2.set(key, value, ttl * 4).await;
        }
    }

    async fn delete(&self, key: &str) {
        self.l1.delete(key).await;
        if let Some(l2) = &self.l2 {
            l2.delete(key).await;
        }
    }

    async fn clear(&self) {
        self.l1.clear().await;
        if let Some(l2) = &self.l2 {
            l2.clear().await;
        }
    }

    async fn stats(&self) -> CacheStats {
        self.l1.stats().await
    }

    async fn get_or_compute(&self, key: &str, ttl: Duration, compute: ComputeFn) -> Result<serde_json::Value> {
        if let Some(v) = self.get(key).await {
            return Ok(v);
        }
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        // Re-check: a concurrent caller may have just finished computing
        // and populated the cache while we waited for the per-key lock.
        if let Some(v) = self.get(key).await {
            return Ok(v);
        }
        let result = compute().await;
        if let Ok(ref value) = result {
            self.set(key, value.clone(), ttl).await;
        }
        result
    }

    async fn sweep_expired(&self) {
        self.l1.sweep_expired().await;
        if let Some(l2) = &self.l2 {
            l2.sweep_expired().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::boxed_compute;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn set_then_get_within_ttl_hits() {
        let cache = TieredCache::new(100, 0, None);
        cache.set("k", serde_json::json!(1), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(serde_json::json!(1)));
    }

    #[tokio::test]
    async fn expired_entry_reports_miss_and_is_evicted() {
        let cache = TieredCache::new(100, 0, None);
        cache.set("k", serde_json::json!(1), Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
        let stats = cache.stats().await;
        assert!(stats.misses >= 1);
    }

    #[tokio::test]
    async fn lru_eviction_drops_least_accessed() {
        let cache = TieredCache::new(2, 0, None);
        cache.set("a", serde_json::json!(1), Duration::from_secs(60)).await;
        cache.set("b", serde_json::json!(2), Duration::from_secs(60)).await;
        // Access "a" so "b" becomes the least-accessed entry.
        cache.get("a").await;
        cache.set("c", serde_json::json!(3), Duration::from_secs(60)).await;
        assert_eq!(cache.get("b").await, None);
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn single_flight_computes_once_for_concurrent_callers() {
        let cache = Arc::new(TieredCache::new(100, 0, None));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(
                        "shared",
                        Duration::from_secs(60),
                        boxed_compute(move || {
                            let calls = calls.clone();
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(20)).await;
                                Ok(serde_json::json!("computed"))
                            }
                        }),
                    )
                    .await
            }));
        }

        for h in handles {
            let v = h.await.unwrap().unwrap();
            assert_eq!(v, serde_json::json!("computed"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
