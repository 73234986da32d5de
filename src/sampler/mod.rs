pub mod strategies;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::BackendClient;
use crate::context::Context;
use crate::error::{DiscoveryError, Result};
use crate::models::{DataSample, TimeRange};

pub use strategies::{AdaptiveStrategy, ReservoirStrategy, StratifiedStrategy, UniformStrategy};

/// Shape summary the strategy-selection rules key off, built from the
/// backend's volume/cardinality signals for a candidate event type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataProfile {
    pub total_records: u64,
    pub has_high_cardinality: bool,
    pub has_time_series: bool,
    pub has_seasonality: bool,
}

#[derive(Debug, Clone)]
pub struct SampleParams {
    pub event_type: String,
    pub time_range: TimeRange,
    pub max_samples: usize,
    pub filter: Option<String>,
    pub strategy_override: Option<String>,
}

impl SampleParams {
    pub fn new(event_type: impl Into<String>, time_range: TimeRange, max_samples: usize) -> Self {
        SampleParams {
            event_type: event_type.into(),
            time_range,
            max_samples,
            filter: None,
            strategy_override: None,
        }
    }
}

/// One sampling algorithm. Implementations only need to pull rows from the
/// backend and shape them into a `DataSample`; the achieved `sampling_rate`
/// reported back is `sample_size / max(1, params.max_samples)`.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn sample(
        &self,
        ctx: &Context,
        backend: &Arc<dyn BackendClient>,
        params: &SampleParams,
    ) -> Result<DataSample>;
}

/// Selects and runs sampling strategies against the configured backend.
/// Runs a 1e9/cardinality/seasonality rule ladder, first match wins.
pub struct Sampler {
    backend: Arc<dyn BackendClient>,
    strategies: HashMap<&'static str, Arc<dyn Strategy>>,
}

impl Sampler {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        let mut strategies: HashMap<&'static str, Arc<dyn Strategy>> = HashMap::new();
        let uniform: Arc<dyn Strategy> = Arc::new(UniformStrategy);
        let reservoir: Arc<dyn Strategy> = Arc::new(ReservoirStrategy);
        let stratified: Arc<dyn Strategy> = Arc::new(StratifiedStrategy);
        let adaptive: Arc<dyn Strategy> = Arc::new(AdaptiveStrategy);
        strategies.insert(uniform.name(), uniform);
        strategies.insert(reservoir.name(), reservoir);
        strategies.insert(stratified.name(), stratified);
        strategies.insert(adaptive.name(), adaptive);
        Sampler { backend, strategies }
    }

    pub fn get_strategy(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(name).cloned()
    }

    /// Rule ladder, first match wins: `totalRecords > 1e9` → adaptive;
    /// high cardinality → reservoir; time series with seasonality →
    /// stratified; otherwise uniform.
    pub fn select_strategy(&self, profile: &DataProfile) -> Arc<dyn Strategy> {
        if profile.total_records > 1_000_000_000 {
            return self.strategies["adaptive"].clone();
        }
        if profile.has_high_cardinality {
            return self.strategies["reservoir"].clone();
        }
        if profile.has_time_series && profile.has_seasonality {
            return self.strategies["stratified"].clone();
        }
        self.strategies["uniform"].clone()
    }

    /// Selects a strategy (honoring `params.strategy_override` when set)
    /// and runs it.
    pub async fn sample(
        &self,
        ctx: &Context,
        profile: &DataProfile,
        params: &SampleParams,
    ) -> Result<DataSample> {
        let strategy = match &params.strategy_override {
            Some(name) => self
                .get_strategy(name)
                .ok_or_else(|| DiscoveryError::InvalidArgument(format!("unknown strategy: {name}")))?,
            None => self.select_strategy(profile),
        };
        strategy.sample(ctx, &self.backend, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_ladder_picks_adaptive_above_one_billion_records() {
        let backend: Arc<dyn BackendClient> = Arc::new(crate::backend::MockBackend::new());
        let sampler = Sampler::new(backend);
        let profile = DataProfile {
            total_records: 2_000_000_000,
            ..Default::default()
        };
        assert_eq!(sampler.select_strategy(&profile).name(), "adaptive");
    }

    #[test]
    fn rule_ladder_picks_reservoir_for_high_cardinality() {
        let backend: Arc<dyn BackendClient> = Arc::new(crate::backend::MockBackend::new());
        let sampler = Sampler::new(backend);
        let profile = DataProfile {
            has_high_cardinality: true,
            ..Default::default()
        };
        assert_eq!(sampler.select_strategy(&profile).name(), "reservoir");
    }

    #[test]
    fn rule_ladder_picks_stratified_for_seasonal_time_series() {
        let backend: Arc<dyn BackendClient> = Arc::new(crate::backend::MockBackend::new());
        let sampler = Sampler::new(backend);
        let profile = DataProfile {
            has_time_series: true,
            has_seasonality: true,
            ..Default::default()
        };
        assert_eq!(sampler.select_strategy(&profile).name(), "stratified");
    }

    #[test]
    fn rule_ladder_defaults_to_uniform() {
        let backend: Arc<dyn BackendClient> = Arc::new(crate::backend::MockBackend::new());
        let sampler = Sampler::new(backend);
        assert_eq!(sampler.select_strategy(&DataProfile::default()).name(), "uniform");
    }

    #[test]
    fn time_series_without_seasonality_does_not_trigger_stratified() {
        let backend: Arc<dyn BackendClient> = Arc::new(crate::backend::MockBackend::new());
        let sampler = Sampler::new(backend);
        let profile = DataProfile {
            has_time_series: true,
            has_seasonality: false,
            ..Default::default()
        };
        assert_eq!(sampler.select_strategy(&profile).name(), "uniform");
    }
}
