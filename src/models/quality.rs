use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sample::TimeRange;

/// The quality-dimension summary carried inline on a `Schema`. Cheaper than
/// a full `QualityReport` — `discoverSingleSchema` only fills `completeness`;
/// `profileSchema(.., full)` runs the full assessor and copies its
/// dimension scores + overall back here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub completeness: f64,
    pub consistency: Option<f64>,
    pub timeliness: Option<f64>,
    pub uniqueness: Option<f64>,
    pub validity: Option<f64>,
    pub overall: Option<f64>,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        QualityMetrics {
            completeness: 0.0,
            consistency: None,
            timeliness: None,
            uniqueness: None,
            validity: None,
            overall: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Completeness,
    Consistency,
    Timeliness,
    Uniqueness,
    Validity,
}

impl DimensionKind {
    pub const ALL: [DimensionKind; 5] = [
        DimensionKind::Completeness,
        DimensionKind::Consistency,
        DimensionKind::Timeliness,
        DimensionKind::Uniqueness,
        DimensionKind::Validity,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityDimension {
    pub kind: DimensionKind,
    pub score: f64,
    pub weight: f64,
    /// Free-text limitation notes (e.g. "no timestamp attribute present").
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Maps a deviation `d = threshold - score` to a severity:
    /// `d>0.3`⇒critical, `d>0.15`⇒high, `d>0.05`⇒medium, else low.
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation > 0.3 {
            Severity::Critical
        } else if deviation > 0.15 {
            Severity::High
        } else if deviation > 0.05 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub dimension: DimensionKind,
    pub severity: Severity,
    pub description: String,
    pub impact: String,
    pub resolution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub schema_name: String,
    pub assessed_at: DateTime<Utc>,
    pub sample_size: usize,
    pub time_range: TimeRange,
    pub dimensions: Vec<QualityDimension>,
    pub overall_score: f64,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<String>,
}

impl QualityReport {
    pub fn dimension(&self, kind: DimensionKind) -> Option<&QualityDimension> {
        self.dimensions.iter().find(|d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_boundaries() {
        assert_eq!(Severity::from_deviation(0.31), Severity::Critical);
        assert_eq!(Severity::from_deviation(0.3), Severity::High);
        assert_eq!(Severity::from_deviation(0.16), Severity::High);
        assert_eq!(Severity::from_deviation(0.15), Severity::Medium);
        assert_eq!(Severity::from_deviation(0.06), Severity::Medium);
        assert_eq!(Severity::from_deviation(0.05), Severity::Low);
        assert_eq!(Severity::from_deviation(0.0), Severity::Low);
    }
}
