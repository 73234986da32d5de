use thiserror::Error;

/// Stable error kinds for the discovery core, per the taxonomy the engine
/// and its collaborators expose to callers. Every variant carries a
/// human-readable message; sensitive values (API keys, account ids) must be
/// passed through [`redact`] before being embedded.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("engine is not running")]
    EngineNotRunning,

    #[error("engine is already running")]
    EngineAlreadyRunning,

    #[error("engine is shutting down")]
    EngineShuttingDown,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend query failed (status {status}): {message}")]
    BackendQueryError { status: u16, message: String },

    #[error("rate limited by backend")]
    RateLimited,

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("cache backend error: {0}")]
    CacheBackendError(String),

    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    #[error("sample is empty")]
    SampleEmpty,

    #[error("worker pool is stopped")]
    PoolStopped,

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("session limit reached")]
    SessionLimit,

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

impl DiscoveryError {
    /// A coarse kind name, stable across message wording changes, suitable
    /// for surfacing to callers that key off error kind rather than text.
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryError::EngineNotRunning => "EngineNotRunning",
            DiscoveryError::EngineAlreadyRunning => "EngineAlreadyRunning",
            DiscoveryError::EngineShuttingDown => "EngineShuttingDown",
            DiscoveryError::InvalidConfig(_) => "InvalidConfig",
            DiscoveryError::InvalidArgument(_) => "InvalidArgument",
            DiscoveryError::BackendUnavailable(_) => "BackendUnavailable",
            DiscoveryError::BackendQueryError { .. } => "BackendQueryError",
            DiscoveryError::RateLimited => "RateLimited",
            DiscoveryError::Timeout => "Timeout",
            DiscoveryError::Cancelled => "Cancelled",
            DiscoveryError::CacheBackendError(_) => "CacheBackendError",
            DiscoveryError::SchemaNotFound(_) => "SchemaNotFound",
            DiscoveryError::SampleEmpty => "SampleEmpty",
            DiscoveryError::PoolStopped => "PoolStopped",
            DiscoveryError::TaskFailed(_) => "TaskFailed",
            DiscoveryError::SessionNotFound(_) => "SessionNotFound",
            DiscoveryError::SessionExpired(_) => "SessionExpired",
            DiscoveryError::SessionLimit => "SessionLimit",
            DiscoveryError::CapabilityUnavailable(_) => "CapabilityUnavailable",
        }
    }
}

/// Redacts a secret-shaped value (API keys, account identifiers) before it
/// is embedded in an error message or log line. Keeps a short prefix so the
/// value is still distinguishable in logs without being reconstructible.
pub fn redact(value: &str) -> String {
    if value.len() <= 4 {
        return "****".to_string();
    }
    format!("{}****", &value[..4])
}
