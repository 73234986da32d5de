pub mod intelligence;
mod profiling;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::backend::{BackendClient, EventTypeFilter};
use crate::cache::{boxed_compute, build_key, Cache, NoopCache, TieredCache};
use crate::config::{Config, ProfileDepth};
use crate::context::{CancelHandle, Context};
use crate::error::{DiscoveryError, Result};
use crate::models::{
    ComponentHealth, DataSample, EngineStatus, HealthStatus, QualityReport, Relationship, Schema,
    TimeRange,
};
use crate::patterns::PatternEngine;
use crate::pool::WorkerPool;
use crate::quality::{QualityAssessor, QualityWeights};
use crate::relationships::{ProfiledSchema, RelationshipMiner, RelationshipMinerConfig};
use crate::sampler::{DataProfile, SampleParams, Sampler, Strategy};
use crate::session::SessionStore;

pub use intelligence::{DiscoveryResult, IntelligenceHints};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    New,
    Initialized,
    Running,
    Stopping,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaFilter {
    pub max_schemas: usize,
    pub min_record_count: Option<u64>,
    pub event_types: Option<Vec<String>>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for SchemaFilter {
    fn default() -> Self {
        SchemaFilter {
            max_schemas: 100,
            min_record_count: None,
            event_types: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Orchestrates the Backend Query Client, Cache, Worker Pool, Sampler,
/// Pattern Engine, Relationship Miner, Quality Assessor and Session Store
/// behind the nine public discovery operations, enforcing the engine's
/// lifecycle state machine.
pub struct DiscoveryEngine {
    config: Config,
    backend: Arc<dyn BackendClient>,
    cache: Arc<dyn Cache>,
    pool: Arc<WorkerPool>,
    sampler: Arc<Sampler>,
    patterns: PatternEngine,
    relationships: RelationshipMiner,
    quality: QualityAssessor,
    pub sessions: SessionStore,
    state: RwLock<LifecycleState>,
    started_at: RwLock<Option<chrono::DateTime<Utc>>>,
    discoveries_total: AtomicU64,
    engine_ctx: RwLock<Option<Context>>,
    cancel_handle: RwLock<Option<CancelHandle>>,
}

impl DiscoveryEngine {
    /// `[New] --new()--> [Initialized]`: builds every collaborator from
    /// `config` but starts no background work — that's `start`'s job.
    pub fn new(config: Config, backend: Arc<dyn BackendClient>) -> Self {
        let pool = Arc::new(WorkerPool::new(config.performance.worker_pool_size));
        let cache: Arc<dyn Cache> = if config.cache.enabled {
            Arc::new(TieredCache::new(10_000, config.cache.max_memory_bytes(), None))
        } else {
            Arc::new(NoopCache::default())
        };
        let sampler = Arc::new(Sampler::new(backend.clone()));
        let patterns = PatternEngine::new(0.7);
        let relationships = RelationshipMiner::new(
            backend.clone(),
            RelationshipMinerConfig {
                min_correlation: config.relationships.min_correlation,
                min_sample_size: config.relationships.min_sample_size,
                max_join_candidates: config.relationships.max_join_candidates,
            },
        );
        let quality = QualityAssessor::new(QualityWeights::default());
        let sessions = SessionStore::new(cache.clone(), 10_000, config.discovery.cache_ttl);

        DiscoveryEngine {
            config,
            backend,
            cache,
            pool,
            sampler,
            patterns,
            relationships,
            quality,
            sessions,
            state: RwLock::new(LifecycleState::Initialized),
            started_at: RwLock::new(None),
            discoveries_total: AtomicU64::new(0),
            engine_ctx: RwLock::new(None),
            cancel_handle: RwLock::new(None),
        }
    }

    async fn require_running(&self) -> Result<()> {
        if *self.state.read().await != LifecycleState::Running {
            return Err(DiscoveryError::EngineNotRunning);
        }
        Ok(())
    }

    /// `[Initialized] --start()--> [Running]`. A second call fails with
    /// `EngineAlreadyRunning`.
    pub async fn start(&self, _ctx: &Context) -> Result<()> {
        let mut state = self.state.write().await;
        match *state {
            LifecycleState::Running | LifecycleState::Stopping => {
                return Err(DiscoveryError::EngineAlreadyRunning);
            }
            LifecycleState::Failed => {
                return Err(DiscoveryError::InvalidConfig("engine previously failed to initialize".into()));
            }
            _ => {}
        }
        let (engine_ctx, handle) = Context::cancellable();
        *self.engine_ctx.write().await = Some(engine_ctx);
        *self.cancel_handle.write().await = Some(handle);
        *self.started_at.write().await = Some(Utc::now());
        *state = LifecycleState::Running;
        tracing::info!("discovery engine started");
        Ok(())
    }

    /// `[Running] --stop()--> [Stopping] --drain--> [Stopped]`. Idempotent:
    /// calling `stop` when already stopped succeeds without effect.
    pub async fn stop(&self, _ctx: &Context) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == LifecycleState::Stopped || *state == LifecycleState::New {
                *state = LifecycleState::Stopped;
                return Ok(());
            }
            *state = LifecycleState::Stopping;
        }
        if let Some(handle) = self.cancel_handle.write().await.take() {
            handle.cancel();
        }
        self.pool.stop().await;
        *self.state.write().await = LifecycleState::Stopped;
        tracing::info!("discovery engine stopped");
        Ok(())
    }

    /// `{status, version, uptime, components, metrics}`. Reads take the
    /// shared lock; never blocks behind a mutating op for long since lock
    /// scopes here are all just field reads.
    pub async fn health(&self) -> HealthStatus {
        let state = *self.state.read().await;
        let status = match state {
            LifecycleState::New | LifecycleState::Initialized => EngineStatus::Initializing,
            LifecycleState::Running => EngineStatus::Healthy,
            LifecycleState::Stopping | LifecycleState::Stopped => EngineStatus::Stopped,
            LifecycleState::Failed => EngineStatus::Degraded,
        };
        let uptime_seconds = self
            .started_at
            .read()
            .await
            .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
            .unwrap_or(0);

        let mut components = HashMap::new();
        let backend_ok = self
            .backend
            .get_event_types(&Context::background(), EventTypeFilter::default())
            .await
            .is_ok();
        components.insert(
            "nrdb".to_string(),
            ComponentHealth {
                status: if backend_ok { "healthy".into() } else { "unhealthy".into() },
                last_check: Utc::now(),
                message: None,
            },
        );
        let cache_stats = self.cache.stats().await;
        components.insert(
            "cache".to_string(),
            ComponentHealth { status: "healthy".into(), last_check: Utc::now(), message: None },
        );
        components.insert(
            "workerPool".to_string(),
            ComponentHealth {
                status: "healthy".into(),
                last_check: Utc::now(),
                message: Some(format!("{} active of {}", self.pool.active_workers(), self.pool.size())),
            },
        );

        let mut metrics = HashMap::new();
        metrics.insert("discoveriesTotal".to_string(), serde_json::json!(self.discoveries_total.load(Ordering::SeqCst)));
        metrics.insert("uptimeSeconds".to_string(), serde_json::json!(uptime_seconds));
        metrics.insert("cacheStats".to_string(), serde_json::to_value(cache_stats).unwrap_or(serde_json::Value::Null));

        HealthStatus { status, version: env!("CARGO_PKG_VERSION").to_string(), uptime_seconds, components, metrics }
    }

    fn default_time_range(&self) -> TimeRange {
        TimeRange::last(chrono::Duration::hours(1))
    }

    /// `discoverSingleSchema`: one-hour-window sample at `defaultSampleSize`,
    /// attributes from the union of keys, a 1-day volume count, and
    /// completeness-only quality.
    async fn discover_single_schema(&self, ctx: &Context, event_type: &str) -> Result<Schema> {
        discover_single_schema_impl(&self.backend, &self.sampler, self.config.discovery.default_sample_size, ctx, event_type).await
    }

    /// `discoverSchemas(ctx, filter) → ordered Schemas`.
    pub async fn discover_schemas(&self, ctx: &Context, filter: &SchemaFilter) -> Result<Vec<Schema>> {
        self.require_running().await?;
        ctx.check()?;

        let cache_key = build_key("discovery", "schemas", filter);
        let cache_ttl = self.config.discovery.cache_ttl;

        let backend = self.backend.clone();
        let sampler = self.sampler.clone();
        let pool = self.pool.clone();
        let default_sample_size = self.config.discovery.default_sample_size;
        let min_schema_records = self.config.discovery.min_schema_records;
        let filter = filter.clone();
        let task_ctx = ctx.clone();

        // The whole miss path (backend lookup + per-schema fan-out) runs as
        // a single `get_or_compute` body, so concurrent callers with the
        // same filter within `cache_ttl` share one backend fan-out rather
        // than each re-running discovery.
        let value = self
            .cache
            .get_or_compute(
                &cache_key,
                cache_ttl,
                crate::cache::boxed_compute(move || async move {
                    let backend_filter = EventTypeFilter {
                        pattern: None,
                        min_record_count: filter.min_record_count.or(Some(min_schema_records)),
                    };
                    let mut candidates = match &filter.event_types {
                        Some(types) => types.clone(),
                        None => backend.get_event_types(&task_ctx, backend_filter).await?,
                    };

                    candidates.retain(|name| {
                        let included = filter.include_patterns.is_empty()
                            || filter.include_patterns.iter().any(|p| crate::backend::wildcard_match(p, name));
                        let excluded = filter.exclude_patterns.iter().any(|p| crate::backend::wildcard_match(p, name));
                        included && !excluded
                    });
                    candidates.truncate(filter.max_schemas.max(1));

                    if candidates.is_empty() {
                        return Ok(serde_json::to_value::<Vec<Schema>>(&Vec::new()).unwrap());
                    }

                    let inner_backend = backend.clone();
                    let inner_sampler = sampler.clone();
                    let inner_ctx = task_ctx.clone();
                    let outcomes = pool
                        .execute_batch(&task_ctx, candidates, move |event_type: String| {
                            let backend = inner_backend.clone();
                            let sampler = inner_sampler.clone();
                            let ctx = inner_ctx.clone();
                            async move { discover_single_schema_impl(&backend, &sampler, default_sample_size, &ctx, &event_type).await }
                        })
                        .await?;

                    let mut schemas = Vec::new();
                    let mut failures = 0usize;
                    for outcome in outcomes {
                        match outcome {
                            crate::pool::TaskOutcome::Value(schema) => schemas.push(schema),
                            crate::pool::TaskOutcome::Error(e) => {
                                tracing::warn!(error = %e, "per-schema discovery task failed, isolating");
                                failures += 1;
                            }
                        }
                    }
                    if schemas.is_empty() && failures > 0 {
                        return Err(DiscoveryError::BackendUnavailable("all schema discovery tasks failed".into()));
                    }

                    Ok(serde_json::to_value(&schemas).unwrap_or(serde_json::Value::Null))
                }),
            )
            .await?;

        self.discoveries_total.fetch_add(1, Ordering::SeqCst);
        serde_json::from_value(value).map_err(|e| DiscoveryError::TaskFailed(e.to_string()))
    }

    /// `profileSchema(ctx, eventType, depth)`.
    pub async fn profile_schema(&self, ctx: &Context, event_type: &str, depth: ProfileDepth) -> Result<Schema> {
        self.require_running().await?;
        ctx.check()?;

        let mut schema = self.discover_single_schema(ctx, event_type).await?;
        if depth == ProfileDepth::Basic {
            return Ok(schema);
        }

        let params = SampleParams::new(event_type, self.default_time_range(), self.config.discovery.default_sample_size);
        let profile = DataProfile::default();
        let sample = self.sampler.sample(ctx, &profile, &params).await?;

        for attr in schema.attributes.iter_mut() {
            let values: Vec<&serde_json::Value> = sample.values_for(&attr.name);
            attr.statistics = profiling::compute_statistics(attr.data_type, &values);
            let owned_values: Vec<serde_json::Value> = values.iter().map(|v| (*v).clone()).collect();
            let patterns = self.patterns.detect_patterns(&owned_values, attr.data_type);
            schema.patterns.extend(patterns.iter().cloned().map(|p| p.with_attribute(attr.name.clone())));
        }

        if depth == ProfileDepth::Standard {
            return Ok(schema);
        }

        for attr in schema.attributes.iter_mut() {
            let values = sample.values_for(&attr.name).into_iter().cloned().collect();
            attr.set_sample_values(values);
        }
        let report = self.quality.assess_schema(ctx, &schema, &sample).await?;
        schema.quality.consistency = report.dimension(crate::models::DimensionKind::Consistency).map(|d| d.score);
        schema.quality.timeliness = report.dimension(crate::models::DimensionKind::Timeliness).map(|d| d.score);
        schema.quality.uniqueness = report.dimension(crate::models::DimensionKind::Uniqueness).map(|d| d.score);
        schema.quality.validity = report.dimension(crate::models::DimensionKind::Validity).map(|d| d.score);
        schema.quality.overall = Some(report.overall_score);

        Ok(schema)
    }

    /// `getSamplingStrategy(ctx, eventType) → Strategy` name.
    pub async fn get_sampling_strategy(&self, ctx: &Context, event_type: &str) -> Result<String> {
        self.require_running().await?;
        ctx.check()?;
        let count_query = format!("SELECT count(*) as c FROM {event_type} SINCE 1 day ago");
        let total_records = self
            .backend
            .query(ctx, &count_query)
            .await?
            .rows
            .first()
            .and_then(|r| r.get("c"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let profile = DataProfile { total_records, ..Default::default() };
        Ok(self.sampler.select_strategy(&profile).name().to_string())
    }

    pub async fn sample_data(&self, ctx: &Context, params: &SampleParams) -> Result<DataSample> {
        self.require_running().await?;
        ctx.check()?;
        let profile = DataProfile::default();
        self.sampler.sample(ctx, &profile, params).await
    }

    pub async fn assess_quality(&self, ctx: &Context, schema_name: &str) -> Result<QualityReport> {
        self.require_running().await?;
        ctx.check()?;
        let schema = self.discover_single_schema(ctx, schema_name).await?;
        let params = SampleParams::new(schema_name, self.default_time_range(), self.config.discovery.default_sample_size);
        let sample = self.sampler.sample(ctx, &DataProfile::default(), &params).await?;
        self.quality.assess_schema(ctx, &schema, &sample).await
    }

    /// `findRelationships(ctx, schemas) → ordered Relationships`. Profiles
    /// each named schema with a fresh sample, then hands the pairs to the
    /// Relationship Miner.
    pub async fn find_relationships(&self, ctx: &Context, schema_names: &[String]) -> Result<Vec<Relationship>> {
        self.require_running().await?;
        ctx.check()?;

        let mut schemas = Vec::new();
        let mut samples = Vec::new();
        for name in schema_names {
            let schema = self.discover_single_schema(ctx, name).await?;
            let params = SampleParams::new(name.clone(), self.default_time_range(), self.config.discovery.default_sample_size);
            let sample = self.sampler.sample(ctx, &DataProfile::default(), &params).await?;
            schemas.push(schema);
            samples.push(sample);
        }
        let profiled: Vec<ProfiledSchema<'_>> = schemas.iter().zip(samples.iter()).map(|(schema, sample)| ProfiledSchema { schema, sample }).collect();
        self.relationships.find_relationships(ctx, &profiled).await
    }

    /// `discoverWithIntelligence(ctx, hints) → DiscoveryResult`.
    pub async fn discover_with_intelligence(&self, ctx: &Context, hints: &IntelligenceHints) -> Result<DiscoveryResult> {
        self.require_running().await?;
        ctx.check()?;

        let (filter, _keyword_count) = intelligence::build_intelligent_filter(hints, self.config.discovery.max_sample_size.min(100));
        let schemas = self.discover_schemas(ctx, &filter).await?;
        let ranked = intelligence::rank_schemas(schemas, &hints.keywords);

        let names: Vec<String> = ranked.iter().map(|s| s.event_type.clone()).collect();
        let relationships = if names.len() >= 2 {
            self.find_relationships(ctx, &names).await.unwrap_or_default()
        } else {
            Vec::new()
        };

        let patterns: Vec<crate::models::Pattern> = ranked.iter().flat_map(|s| s.patterns.clone()).collect();
        let insights = intelligence::build_insights(&ranked, &relationships);
        let recommendations: Vec<String> = insights
            .iter()
            .filter(|i| i.severity == intelligence::InsightSeverity::Warning)
            .map(|i| format!("review {}: {}", i.schema, i.message))
            .collect();
        let execution_plan = intelligence::build_execution_plan(ranked.len(), relationships.len());

        let mut metadata = HashMap::new();
        metadata.insert("schemaCount".to_string(), serde_json::json!(ranked.len()));
        metadata.insert("relationshipCount".to_string(), serde_json::json!(relationships.len()));

        Ok(DiscoveryResult { schemas: ranked, patterns, insights, recommendations, execution_plan, metadata })
    }
}

/// Free-function body of `discoverSingleSchema`, taking owned/borrowed
/// collaborators instead of `&self` so it can run inside a Worker Pool
/// task closure (`'static`) without the engine itself needing to be `Arc`.
async fn discover_single_schema_impl(
    backend: &Arc<dyn BackendClient>,
    sampler: &Sampler,
    default_sample_size: usize,
    ctx: &Context,
    event_type: &str,
) -> Result<Schema> {
    let time_range = TimeRange::last(chrono::Duration::hours(1));
    let params = SampleParams::new(event_type, time_range, default_sample_size);
    let profile = DataProfile::default();
    let sample = sampler.sample(ctx, &profile, &params).await?;

    let mut schema = Schema::new(event_type);
    schema.attributes = profiling::infer_attributes(&sample.records);
    schema.sample_count = sample.records.len() as u64;

    let count_query = format!("SELECT count(*) as c FROM {event_type} SINCE 1 day ago");
    let count_result = backend.query(ctx, &count_query).await?;
    let total_records = count_result
        .rows
        .first()
        .and_then(|r| r.get("c"))
        .and_then(|v| v.as_u64())
        .unwrap_or(sample.records.len() as u64);
    schema.volume = crate::models::DataVolumeProfile::from_daily_count(total_records, total_records);

    let missing = schema.attributes.iter().map(|a| a.null_ratio).sum::<f64>() / schema.attributes.len().max(1) as f64;
    schema.quality.completeness = (1.0 - missing).clamp(0.0, 1.0);

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::models::Record;

    fn fixture_backend() -> Arc<dyn BackendClient> {
        let mut record = Record::new();
        record.insert("customerId".into(), serde_json::json!("cust-1"));
        record.insert("amount".into(), serde_json::json!(42.0));
        let backend = MockBackend::new()
            .with_event_type("Transaction", vec![record.clone(); 20])
            .with_event_type("PageView", vec![record; 20]);
        Arc::new(backend)
    }

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.backend.api_key = "NRAK-TEST".into();
        config.backend.account_id = "123".into();
        config.performance.worker_pool_size = 4;
        config
    }

    #[tokio::test]
    async fn public_operations_require_running_state() {
        let engine = DiscoveryEngine::new(valid_config(), fixture_backend());
        let ctx = Context::background();
        let err = engine.discover_schemas(&ctx, &SchemaFilter::default()).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::EngineNotRunning));
    }

    #[tokio::test]
    async fn start_is_not_idempotent() {
        let engine = DiscoveryEngine::new(valid_config(), fixture_backend());
        let ctx = Context::background();
        engine.start(&ctx).await.unwrap();
        let err = engine.start(&ctx).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::EngineAlreadyRunning));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let engine = DiscoveryEngine::new(valid_config(), fixture_backend());
        let ctx = Context::background();
        engine.start(&ctx).await.unwrap();
        engine.stop(&ctx).await.unwrap();
        engine.stop(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn discover_schemas_respects_max_schemas() {
        let engine = DiscoveryEngine::new(valid_config(), fixture_backend());
        let ctx = Context::background();
        engine.start(&ctx).await.unwrap();
        let filter = SchemaFilter { max_schemas: 1, ..Default::default() };
        let schemas = engine.discover_schemas(&ctx, &filter).await.unwrap();
        assert!(schemas.len() <= 1);
    }

    #[tokio::test]
    async fn empty_backend_yields_empty_not_error() {
        let engine = DiscoveryEngine::new(valid_config(), Arc::new(MockBackend::new()));
        let ctx = Context::background();
        engine.start(&ctx).await.unwrap();
        let schemas = engine.discover_schemas(&ctx, &SchemaFilter::default()).await.unwrap();
        assert!(schemas.is_empty());
    }

    #[tokio::test]
    async fn health_reports_running_after_start() {
        let engine = DiscoveryEngine::new(valid_config(), fixture_backend());
        let ctx = Context::background();
        engine.start(&ctx).await.unwrap();
        let health = engine.health().await;
        assert_eq!(health.status, EngineStatus::Healthy);
    }

    #[tokio::test]
    async fn discover_with_intelligence_ranks_and_produces_plan() {
        let engine = DiscoveryEngine::new(valid_config(), fixture_backend());
        let ctx = Context::background();
        engine.start(&ctx).await.unwrap();
        let hints = IntelligenceHints { keywords: vec!["transaction".into()], purpose: None, domain: None };
        let result = engine.discover_with_intelligence(&ctx, &hints).await.unwrap();
        assert!(!result.execution_plan.steps.is_empty());
        assert!(!result.schemas.is_empty());
        assert_eq!(result.schemas[0].event_type, "Transaction");
    }

    #[tokio::test]
    async fn keyword_include_patterns_match_pascal_case_event_types() {
        let engine = DiscoveryEngine::new(valid_config(), fixture_backend());
        let ctx = Context::background();
        engine.start(&ctx).await.unwrap();
        let hints = IntelligenceHints {
            keywords: vec!["transaction".into(), "performance".into()],
            purpose: None,
            domain: Some("apm".into()),
        };
        let result = engine.discover_with_intelligence(&ctx, &hints).await.unwrap();
        assert_eq!(result.schemas[0].event_type, "Transaction");
        assert!(!result.insights.is_empty());
        assert!(!result.recommendations.is_empty());
    }
}
