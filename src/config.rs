use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

/// Top-level config loaded from `discovery.toml` (or the path named by
/// `DISCOVERY_CONFIG`), overlaid with environment-variable overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub discovery: DiscoverySection,
    pub cache: CacheConfig,
    pub performance: PerformanceConfig,
    pub relationships: RelationshipsConfig,
    /// Override target for `DISCOVERY_TRACING_ENDPOINT`; not itself part of
    /// the file schema, carried for whichever transport wires up exporting.
    pub tracing_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendConfig::default(),
            discovery: DiscoverySection::default(),
            cache: CacheConfig::default(),
            performance: PerformanceConfig::default(),
            relationships: RelationshipsConfig::default(),
            tracing_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub account_id: String,
    pub region: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub max_retries: u32,
    pub rate_limit_per_minute: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_url: String::new(),
            api_key: String::new(),
            account_id: String::new(),
            region: "us".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            rate_limit_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileDepth {
    Basic,
    Standard,
    Full,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub max_concurrency: usize,
    pub default_sample_size: usize,
    pub max_sample_size: usize,
    #[serde(with = "duration_secs")]
    pub discovery_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
    pub enable_ml_patterns: bool,
    pub min_schema_records: u64,
    pub profile_depth: ProfileDepth,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        DiscoverySection {
            max_concurrency: 10,
            default_sample_size: 1000,
            max_sample_size: 10_000,
            discovery_timeout: Duration::from_secs(5 * 60),
            cache_ttl: Duration::from_secs(60 * 60),
            enable_ml_patterns: true,
            min_schema_records: 100,
            profile_depth: ProfileDepth::Standard,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_memory: String,
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,
    #[serde(with = "duration_secs")]
    pub schema_ttl: Duration,
    #[serde(with = "duration_secs")]
    pub pattern_ttl: Duration,
    /// Carried through from config for forward-compatible callers; no
    /// prefetch policy is implemented.
    pub enable_predictive: bool,
    /// Cache store URL for an optional distributed (L2) tier. Empty means
    /// L2 is disabled and the cache runs L1-only.
    pub store_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            max_memory: "1GB".to_string(),
            default_ttl: Duration::from_secs(60 * 60),
            schema_ttl: Duration::from_secs(4 * 60 * 60),
            pattern_ttl: Duration::from_secs(24 * 60 * 60),
            enable_predictive: true,
            store_url: String::new(),
        }
    }
}

impl CacheConfig {
    /// Parses `max_memory` (e.g. `"1GB"`, `"512MB"`) into bytes. Falls back
    /// to 1GB on an unparseable value rather than failing construction.
    pub fn max_memory_bytes(&self) -> u64 {
        parse_memory(&self.max_memory).unwrap_or(1024 * 1024 * 1024)
    }
}

fn parse_memory(s: &str) -> Option<u64> {
    let s = s.trim();
    let (num, mult): (&str, u64) = if let Some(n) = s.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1024)
    } else {
        (s, 1)
    };
    num.trim().parse::<u64>().ok().map(|v| v * mult)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub worker_pool_size: usize,
    pub query_batch_size: usize,
    pub streaming_enabled: bool,
    pub circuit_breaker_limit: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            worker_pool_size: 20,
            query_batch_size: 10,
            streaming_enabled: true,
            circuit_breaker_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelationshipsConfig {
    pub min_correlation: f64,
    pub min_sample_size: usize,
    pub max_join_candidates: usize,
    pub parallel_workers: usize,
}

impl Default for RelationshipsConfig {
    fn default() -> Self {
        RelationshipsConfig {
            min_correlation: 0.7,
            min_sample_size: 100,
            max_join_candidates: 50,
            parallel_workers: 4,
        }
    }
}

impl Config {
    /// Loads config from `path` if it exists (defaults otherwise), then
    /// applies environment-variable overrides, then validates. Mirrors the
    /// load-then-overlay-then-validate order the backend connection
    /// settings already follow in this codebase.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                DiscoveryError::InvalidConfig(format!("reading {}: {e}", path.display()))
            })?;
            let config: Config = toml::from_str(&contents)
                .map_err(|e| DiscoveryError::InvalidConfig(format!("parsing config: {e}")))?;
            tracing::info!("loaded config from {}", path.display());
            config
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overlays `DISCOVERY_BACKEND_API_KEY`, `DISCOVERY_BACKEND_ACCOUNT_ID`,
    /// `DISCOVERY_CACHE_URL`, and `DISCOVERY_TRACING_ENDPOINT` on top of
    /// whatever was loaded from file, taking precedence.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DISCOVERY_BACKEND_API_KEY") {
            self.backend.api_key = v;
        }
        if let Ok(v) = std::env::var("DISCOVERY_BACKEND_ACCOUNT_ID") {
            self.backend.account_id = v;
        }
        if let Ok(v) = std::env::var("DISCOVERY_CACHE_URL") {
            self.cache.store_url = v;
        }
        if let Ok(v) = std::env::var("DISCOVERY_TRACING_ENDPOINT") {
            self.tracing_endpoint = Some(v);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.backend.api_key.is_empty() {
            return Err(DiscoveryError::InvalidConfig("backend.apiKey is required".into()));
        }
        if self.backend.account_id.is_empty() {
            return Err(DiscoveryError::InvalidConfig("backend.accountId is required".into()));
        }
        if self.performance.worker_pool_size == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "performance.workerPoolSize must be >= 1".into(),
            ));
        }
        if self.discovery.max_sample_size < self.discovery.default_sample_size {
            return Err(DiscoveryError::InvalidConfig(
                "discovery.maxSampleSize must be >= discovery.defaultSampleSize".into(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.backend.api_key = "NRAK-TEST".into();
        config.backend.account_id = "12345".into();
        config
    }

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.discovery.max_concurrency, 10);
        assert_eq!(config.discovery.default_sample_size, 1000);
        assert_eq!(config.discovery.max_sample_size, 10_000);
        assert_eq!(config.performance.worker_pool_size, 20);
        assert_eq!(config.performance.circuit_breaker_limit, 5);
        assert_eq!(config.relationships.min_correlation, 0.7);
    }

    #[test]
    fn validation_rejects_missing_credentials() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(DiscoveryError::InvalidConfig(_))));
    }

    #[test]
    fn validation_rejects_zero_worker_pool() {
        let mut config = valid_config();
        config.performance.worker_pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_max_sample_below_default() {
        let mut config = valid_config();
        config.discovery.max_sample_size = 10;
        config.discovery.default_sample_size = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn max_memory_parses_suffixes() {
        let cache = CacheConfig { max_memory: "512MB".into(), ..CacheConfig::default() };
        assert_eq!(cache.max_memory_bytes(), 512 * 1024 * 1024);
    }
}
