pub mod key;
pub mod noop;
pub mod tiered;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

pub use key::build as build_key;
pub use noop::NoopCache;
pub use tiered::TieredCache;

use crate::error::Result;
use crate::models::CacheStats;

pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
pub type ComputeFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<serde_json::Value>> + Send>;

/// Fingerprint-keyed, TTL-bounded result cache. Trait object boundary: the
/// Engine holds `Arc<dyn Cache>` so production, no-op, and tiered
/// implementations are interchangeable at construction.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<serde_json::Value>;
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);
    async fn delete(&self, key: &str);
    async fn clear(&self);
    async fn stats(&self) -> CacheStats;

    /// Single-flight get-or-compute: concurrent calls for the same `key`
    /// coalesce onto a single in-flight computation rather than each
    /// recomputing.
    async fn get_or_compute(&self, key: &str, ttl: Duration, compute: ComputeFn) -> Result<serde_json::Value>;

    /// Runs the periodic sweeper pass that evicts expired entries (default
    /// interval: 1 minute). A no-op for caches with nothing to sweep.
    async fn sweep_expired(&self) {}
}

pub fn boxed_compute<F, Fut>(f: F) -> ComputeFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<serde_json::Value>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}
