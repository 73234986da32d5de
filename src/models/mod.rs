pub mod attribute;
pub mod cache;
pub mod health;
pub mod pattern;
pub mod quality;
pub mod relationship;
pub mod sample;
pub mod schema;
pub mod session;

pub use attribute::{Attribute, CardinalityInfo, DataType, SemanticType, Statistics};
pub use cache::CacheStats;
pub use health::{ComponentHealth, EngineStatus, HealthStatus};
pub use pattern::{Pattern, PatternEvidence, PatternType};
pub use quality::{DimensionKind, Issue, QualityDimension, QualityMetrics, QualityReport, Severity};
pub use relationship::{
    Evidence, JoinKeys, JoinType, JoinabilityResult, Relationship, RelationshipGraph,
    RelationshipType,
};
pub use sample::{DataSample, Record, TimeRange};
pub use schema::{digest12, digest32, DataVolumeProfile, Schema};
pub use session::{Session, SessionPreferences};
