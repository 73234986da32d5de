pub mod distribution;
pub mod format;
pub mod sequence;
pub mod timeseries;

use crate::models::pattern::rank_patterns;
use crate::models::{DataType, Pattern};

/// Applies the detector families applicable to `data_type` over `values`
/// and returns the ranked, floor-filtered result.
pub struct PatternEngine {
    confidence_floor: f64,
}

impl PatternEngine {
    pub fn new(confidence_floor: f64) -> Self {
        PatternEngine { confidence_floor }
    }

    pub fn detect_patterns(&self, values: &[serde_json::Value], data_type: DataType) -> Vec<Pattern> {
        let mut found = Vec::new();

        match data_type {
            DataType::Numeric => {
                found.extend(timeseries::detect(values));
                found.extend(distribution::detect(values));
                found.extend(sequence::detect_numeric(values));
            }
            DataType::Timestamp => {
                found.extend(timeseries::detect(values));
            }
            DataType::String => {
                found.extend(format::detect(values));
                found.extend(sequence::detect_strings(values));
                found.extend(distribution::detect_categorical(values));
            }
            DataType::Boolean | DataType::Array | DataType::Json | DataType::Unknown => {}
        }

        rank_patterns(found, self.confidence_floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatches_numeric_detectors_and_ranks_result() {
        let engine = PatternEngine::new(0.0);
        let values: Vec<serde_json::Value> = (0..20).map(|i| json!(i as f64)).collect();
        let patterns = engine.detect_patterns(&values, DataType::Numeric);
        assert!(!patterns.is_empty());
        for w in patterns.windows(2) {
            assert!(w[0].confidence >= w[1].confidence);
        }
    }

    #[test]
    fn floor_filters_low_confidence_patterns() {
        let engine = PatternEngine::new(0.99);
        let values: Vec<serde_json::Value> = vec![json!("a"), json!("b"), json!(1)];
        let patterns = engine.detect_patterns(&values, DataType::String);
        assert!(patterns.iter().all(|p| p.confidence >= 0.99));
    }
}
