use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::attribute::Attribute;
use super::quality::QualityMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataVolumeProfile {
    pub total_records: u64,
    pub records_per_day: f64,
    pub records_per_hour: f64,
}

impl DataVolumeProfile {
    pub fn from_daily_count(total_records: u64, records_last_day: u64) -> Self {
        let records_per_day = records_last_day as f64;
        DataVolumeProfile {
            total_records,
            records_per_day,
            records_per_hour: records_per_day / 24.0,
        }
    }
}

/// The inferred shape of one event type. `id` is a pure function of
/// `event_type` (a 12-hex digest), so two schemas with equal `event_type`
/// are equal in identity regardless of when they were built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub name: String,
    pub event_type: String,
    pub attributes: Vec<Attribute>,
    pub sample_count: u64,
    pub volume: DataVolumeProfile,
    pub quality: QualityMetrics,
    pub patterns: Vec<super::pattern::Pattern>,
    pub discovered_at: DateTime<Utc>,
    pub last_analyzed_at: DateTime<Utc>,
}

/// 12-hex-character digest of `event_type`, stable across calls and
/// independent of any other schema state.
pub fn digest12(event_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_type.as_bytes());
    let out = hasher.finalize();
    hex_prefix(&out, 6) // 6 bytes = 12 hex chars
}

/// 32-hex-character digest used for cache keys (see `cache::key`).
pub fn digest32(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let out = hasher.finalize();
    hex_prefix(&out, 16)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes[..n].iter().map(|b| format!("{b:02x}")).collect()
}

impl Schema {
    pub fn new(event_type: impl Into<String>) -> Self {
        let event_type = event_type.into();
        let id = digest12(&event_type);
        let now = Utc::now();
        Schema {
            id,
            name: event_type.clone(),
            event_type,
            attributes: Vec::new(),
            sample_count: 0,
            volume: DataVolumeProfile {
                total_records: 0,
                records_per_day: 0.0,
                records_per_hour: 0.0,
            },
            quality: QualityMetrics::default(),
            patterns: Vec::new(),
            discovered_at: now,
            last_analyzed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_pure_function_of_event_type() {
        let s1 = Schema::new("Transaction");
        let s2 = Schema::new("Transaction");
        assert_eq!(s1.id, s2.id);
        assert_eq!(s1.id, digest12("Transaction"));
        assert_eq!(s1.id.len(), 12);
    }

    #[test]
    fn different_event_types_get_different_ids() {
        let s1 = Schema::new("Transaction");
        let s2 = Schema::new("PageView");
        assert_ne!(s1.id, s2.id);
    }

    #[test]
    fn digest32_is_32_chars_and_deterministic() {
        let a = digest32("schemas:{\"maxSchemas\":10}");
        let b = digest32("schemas:{\"maxSchemas\":10}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }
}
