pub mod circuit_breaker;
pub mod clickhouse_backend;
pub mod mock;
pub mod rate_limiter;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;
use crate::models::Record;

pub use circuit_breaker::CircuitBreaker;
pub use clickhouse_backend::ClickHouseBackend;
pub use mock::MockBackend;
pub use rate_limiter::RateLimiter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub event_types_touched: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Record>,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub account_id: Option<String>,
    pub timeout: Option<Duration>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct EventTypeFilter {
    pub pattern: Option<String>,
    pub min_record_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
}

/// Minimal glob matcher for `*substr*`, `*suffix`, `prefix*`, and exact
/// match, used for schema include/exclude filtering. Matches
/// case-insensitively, mirroring the case-insensitive keyword matching
/// `discoverWithIntelligence` scores schemas with.
pub fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let candidate = candidate.to_lowercase();
    if let Some(inner) = pattern.strip_prefix('*').and_then(|s| s.strip_suffix('*')) {
        candidate.contains(inner)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        candidate.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        candidate.starts_with(prefix)
    } else {
        candidate == pattern
    }
}

/// Capability set for the backend columnar store. Production, mock, and
/// instrumented implementations are selected at construction; the Engine
/// only ever depends on this trait.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn query(&self, ctx: &Context, text: &str) -> Result<QueryResult>;

    async fn query_with_options(
        &self,
        ctx: &Context,
        text: &str,
        options: QueryOptions,
    ) -> Result<QueryResult>;

    async fn get_event_types(&self, ctx: &Context, filter: EventTypeFilter) -> Result<Vec<String>>;

    async fn get_accounts(&self, ctx: &Context) -> Result<Vec<Account>>;
}
