use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::backend::{BackendClient, QueryOptions};
use crate::context::Context;
use crate::error::Result;
use crate::models::{DataSample, Record, TimeRange};

use super::{SampleParams, Strategy};

fn where_clause(params: &SampleParams) -> String {
    let mut clauses = vec![
        format!("timestamp >= parseDateTimeBestEffort('{}')", params.time_range.start.to_rfc3339()),
        format!("timestamp <= parseDateTimeBestEffort('{}')", params.time_range.end.to_rfc3339()),
    ];
    if let Some(filter) = &params.filter {
        clauses.push(format!("({filter})"));
    }
    clauses.join(" AND ")
}

async fn fetch(
    ctx: &Context,
    backend: &Arc<dyn BackendClient>,
    params: &SampleParams,
    order_by: &str,
    limit: usize,
) -> Result<Vec<Record>> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} {} LIMIT {}",
        params.event_type,
        where_clause(params),
        order_by,
        limit,
    );
    let result = backend
        .query_with_options(ctx, &sql, QueryOptions { max_results: Some(limit), ..Default::default() })
        .await?;
    Ok(result.rows)
}

fn build_sample(event_type: &str, records: Vec<Record>, max_samples: usize, strategy: &str, time_range: TimeRange) -> DataSample {
    let rate = if max_samples == 0 {
        0.0
    } else {
        (records.len() as f64 / max_samples as f64).min(1.0)
    };
    DataSample::new(event_type, records, rate, strategy, time_range)
}

/// Default strategy: a plain randomized pull, bounded by `maxSamples`, the
/// fallback when no other selection rule matches.
pub struct UniformStrategy;

#[async_trait]
impl Strategy for UniformStrategy {
    fn name(&self) -> &'static str {
        "uniform"
    }

    async fn sample(&self, ctx: &Context, backend: &Arc<dyn BackendClient>, params: &SampleParams) -> Result<DataSample> {
        ctx.check()?;
        let records = fetch(ctx, backend, params, "ORDER BY rand()", params.max_samples).await?;
        Ok(build_sample(&params.event_type, records, params.max_samples, self.name(), params.time_range))
    }
}

/// Bounded-memory strategy for high-cardinality attributes (rule 2). Pulls a
/// larger candidate window from the backend and reduces it to `maxSamples`
/// with Algorithm R, so memory use never exceeds the target sample size
/// regardless of how much candidate data the backend holds.
pub struct ReservoirStrategy;

#[async_trait]
impl Strategy for ReservoirStrategy {
    fn name(&self) -> &'static str {
        "reservoir"
    }

    async fn sample(&self, ctx: &Context, backend: &Arc<dyn BackendClient>, params: &SampleParams) -> Result<DataSample> {
        ctx.check()?;
        let candidate_window = params.max_samples.saturating_mul(4).max(params.max_samples);
        let candidates = fetch(ctx, backend, params, "ORDER BY timestamp", candidate_window).await?;

        let mut reservoir: Vec<Record> = Vec::with_capacity(params.max_samples);
        let mut rng = rand::thread_rng();
        for (i, record) in candidates.into_iter().enumerate() {
            if reservoir.len() < params.max_samples {
                reservoir.push(record);
            } else {
                let j = rng.gen_range(0..=i);
                if j < params.max_samples {
                    reservoir[j] = record;
                }
            }
        }
        Ok(build_sample(&params.event_type, reservoir, params.max_samples, self.name(), params.time_range))
    }
}

/// Time-bucketed strategy for seasonal time series (rule 3): divides the
/// requested range into equal buckets and draws a proportional share from
/// each, so the sample doesn't skew toward whichever sub-interval the
/// backend happens to return first.
pub struct StratifiedStrategy;

const BUCKET_COUNT: usize = 8;

#[async_trait]
impl Strategy for StratifiedStrategy {
    fn name(&self) -> &'static str {
        "stratified"
    }

    async fn sample(&self, ctx: &Context, backend: &Arc<dyn BackendClient>, params: &SampleParams) -> Result<DataSample> {
        ctx.check()?;
        let total = params.time_range.duration();
        let bucket_duration = total / BUCKET_COUNT as i32;
        let per_bucket = (params.max_samples / BUCKET_COUNT).max(1);

        let mut records = Vec::with_capacity(params.max_samples);
        for i in 0..BUCKET_COUNT {
            ctx.check()?;
            let start = params.time_range.start + bucket_duration * i as i32;
            let end = if i == BUCKET_COUNT - 1 { params.time_range.end } else { start + bucket_duration };
            let bucket_params = SampleParams {
                time_range: TimeRange::new(start, end),
                ..params.clone()
            };
            let bucket_rows = fetch(ctx, backend, &bucket_params, "ORDER BY timestamp", per_bucket).await?;
            records.extend(bucket_rows);
        }
        records.truncate(params.max_samples);
        Ok(build_sample(&params.event_type, records, params.max_samples, self.name(), params.time_range))
    }
}

/// Multi-pass strategy for very large event types (rule 1): a small pilot
/// pull establishes whether the backend actually has enough matching rows
/// before committing to the full-size query.
pub struct AdaptiveStrategy;

impl AdaptiveStrategy {
    const PILOT_FRACTION: usize = 10;
}

#[async_trait]
impl Strategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    async fn sample(&self, ctx: &Context, backend: &Arc<dyn BackendClient>, params: &SampleParams) -> Result<DataSample> {
        ctx.check()?;
        let pilot_size = (params.max_samples / Self::PILOT_FRACTION).max(1);
        let pilot = fetch(ctx, backend, params, "ORDER BY rand()", pilot_size).await?;

        if pilot.len() < pilot_size {
            // Pilot already exhausted the available rows; no point growing.
            return Ok(build_sample(&params.event_type, pilot, params.max_samples, self.name(), params.time_range));
        }

        ctx.check()?;
        let full = fetch(ctx, backend, params, "ORDER BY rand()", params.max_samples).await?;
        Ok(build_sample(&params.event_type, full, params.max_samples, self.name(), params.time_range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn fixture(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                let mut r = Record::new();
                r.insert("id".into(), serde_json::json!(i));
                r
            })
            .collect()
    }

    #[tokio::test]
    async fn uniform_respects_max_samples() {
        let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::new().with_event_type("Transaction", fixture(50)));
        let ctx = Context::background();
        let params = SampleParams::new("Transaction", TimeRange::last(chrono::Duration::hours(1)), 10);
        let sample = UniformStrategy.sample(&ctx, &backend, &params).await.unwrap();
        assert!(sample.sample_size <= 10);
    }

    #[tokio::test]
    async fn reservoir_never_exceeds_max_samples() {
        let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::new().with_event_type("Transaction", fixture(200)));
        let ctx = Context::background();
        let params = SampleParams::new("Transaction", TimeRange::last(chrono::Duration::hours(1)), 20);
        let sample = ReservoirStrategy.sample(&ctx, &backend, &params).await.unwrap();
        assert!(sample.sample_size <= 20);
    }

    #[tokio::test]
    async fn stratified_draws_from_multiple_buckets() {
        let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::new().with_event_type("Transaction", fixture(100)));
        let ctx = Context::background();
        let params = SampleParams::new("Transaction", TimeRange::last(chrono::Duration::hours(8)), 16);
        let sample = StratifiedStrategy.sample(&ctx, &backend, &params).await.unwrap();
        assert_eq!(sample.strategy, "stratified");
        assert!(sample.sample_size <= 16);
    }

    #[tokio::test]
    async fn adaptive_short_circuits_on_sparse_data() {
        let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::new().with_event_type("Rare", fixture(2)));
        let ctx = Context::background();
        let params = SampleParams::new("Rare", TimeRange::last(chrono::Duration::hours(1)), 100);
        let sample = AdaptiveStrategy.sample(&ctx, &backend, &params).await.unwrap();
        assert!(sample.sample_size <= 2);
    }
}
