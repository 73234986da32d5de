use serde::{Deserialize, Serialize};

/// Storage-level type of an attribute's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Numeric,
    Boolean,
    Timestamp,
    Array,
    Json,
    Unknown,
}

/// High-level meaning of an attribute, independent of its storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Id,
    Email,
    Url,
    Ip,
    Metric,
    Category,
    Timestamp,
    UserAgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardinalityInfo {
    pub unique: u64,
    pub total: u64,
}

impl CardinalityInfo {
    pub fn new(unique: u64, total: u64) -> Self {
        Self { unique, total }
    }

    /// `unique / total`, or 0.0 when there are no observations.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.unique as f64 / self.total as f64
        }
    }

    /// `ratio() > 0.8`, per the glossary's cardinality-ratio definition.
    pub fn is_high_cardinality(&self) -> bool {
        self.ratio() > 0.8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub percentiles: Percentiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringStatistics {
    pub min_length: usize,
    pub max_length: usize,
    pub avg_length: f64,
    pub empty_count: u64,
    pub distinct_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Statistics {
    Numeric(NumericStatistics),
    Strings(StringStatistics),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    pub semantic_type: Option<SemanticType>,
    pub cardinality: CardinalityInfo,
    pub statistics: Option<Statistics>,
    /// At most 5 representative values, per the data model's sample cap.
    pub sample_values: Vec<serde_json::Value>,
    pub null_ratio: f64,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            semantic_type: None,
            cardinality: CardinalityInfo::new(0, 0),
            statistics: None,
            sample_values: Vec::new(),
            null_ratio: 0.0,
        }
    }

    /// True for attributes the relationship miner treats as ID-like: an
    /// explicit `SemanticType::Id`, or a name ending in `Id`/`ID`/`id`.
    pub fn is_id_like(&self) -> bool {
        matches!(self.semantic_type, Some(SemanticType::Id))
            || self.name.ends_with("Id")
            || self.name.ends_with("ID")
            || self.name.ends_with("id")
    }

    /// Caps `sample_values` to the data model's 5-value limit.
    pub fn set_sample_values(&mut self, mut values: Vec<serde_json::Value>) {
        values.truncate(5);
        self.sample_values = values;
    }
}
