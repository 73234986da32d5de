use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use wide_discovery_engine::backend::{BackendClient, ClickHouseBackend};
use wide_discovery_engine::context::Context;
use wide_discovery_engine::engine::{DiscoveryEngine, IntelligenceHints, SchemaFilter};
use wide_discovery_engine::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("wide_discovery_engine=debug")
        }))
        .init();

    let config_path = std::env::var("DISCOVERY_CONFIG").unwrap_or_else(|_| "discovery.toml".to_string());
    let config = Config::load(&config_path)?;

    let clickhouse_url = std::env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
    let clickhouse_db = std::env::var("CLICKHOUSE_DATABASE").unwrap_or_else(|_| "observability".to_string());
    let clickhouse_user = std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
    let clickhouse_password = std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();

    let backend: Arc<dyn BackendClient> = Arc::new(ClickHouseBackend::new(
        &clickhouse_url,
        &clickhouse_db,
        &clickhouse_user,
        &clickhouse_password,
        &config.backend.account_id,
        config.backend.max_retries,
        config.backend.timeout,
        config.backend.rate_limit_per_minute,
        config.performance.circuit_breaker_limit,
    ));

    let engine = DiscoveryEngine::new(config, backend);
    let ctx = Context::background();
    engine.start(&ctx).await?;
    tracing::info!("discovery engine started");

    let schemas = engine.discover_schemas(&ctx, &SchemaFilter::default()).await?;
    tracing::info!(count = schemas.len(), "discovered schemas");

    let hints = IntelligenceHints { keywords: vec!["error".into()], purpose: Some("investigate error rates".into()), domain: None };
    let result = engine.discover_with_intelligence(&ctx, &hints).await?;
    tracing::info!(
        schemas = result.schemas.len(),
        insights = result.insights.len(),
        "intelligent discovery complete"
    );

    let health = engine.health().await;
    tracing::info!(status = ?health.status, uptime = health.uptime_seconds, "engine health");

    engine.stop(&ctx).await?;
    tracing::info!("discovery engine stopped");
    Ok(())
}
