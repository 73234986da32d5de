use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Trend,
    Seasonality,
    Stationarity,
    Anomaly,
    Distribution,
    Format,
    MixedFormat,
    Sequence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEvidence {
    pub description: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub attributes: Vec<String>,
    pub description: String,
    pub evidence: Vec<PatternEvidence>,
}

impl Pattern {
    pub fn new(
        pattern_type: PatternType,
        confidence: f64,
        description: impl Into<String>,
    ) -> Self {
        Pattern {
            pattern_type,
            confidence: confidence.clamp(0.0, 1.0),
            attributes: Vec::new(),
            description: description.into(),
            evidence: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attr: impl Into<String>) -> Self {
        self.attributes.push(attr.into());
        self
    }

    pub fn with_evidence(mut self, description: impl Into<String>, value: serde_json::Value) -> Self {
        self.evidence.push(PatternEvidence {
            description: description.into(),
            value,
        });
        self
    }
}

/// Sorts by confidence descending, ties broken by evidence count
/// descending, and drops anything below `floor`.
pub fn rank_patterns(mut patterns: Vec<Pattern>, floor: f64) -> Vec<Pattern> {
    patterns.retain(|p| p.confidence >= floor);
    patterns.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.evidence.len().cmp(&a.evidence.len()))
    });
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_drops_below_floor_and_sorts_descending() {
        let patterns = vec![
            Pattern::new(PatternType::Trend, 0.6, "low"),
            Pattern::new(PatternType::Anomaly, 0.9, "high"),
            Pattern::new(PatternType::Format, 0.75, "mid"),
        ];
        let ranked = rank_patterns(patterns, 0.7);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].description, "high");
        assert_eq!(ranked[1].description, "mid");
    }

    #[test]
    fn ties_broken_by_evidence_count() {
        let a = Pattern::new(PatternType::Trend, 0.8, "a")
            .with_evidence("e1", serde_json::json!(1));
        let b = Pattern::new(PatternType::Trend, 0.8, "b")
            .with_evidence("e1", serde_json::json!(1))
            .with_evidence("e2", serde_json::json!(2));
        let ranked = rank_patterns(vec![a, b], 0.0);
        assert_eq!(ranked[0].description, "b");
    }
}
