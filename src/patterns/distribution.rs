use std::collections::HashMap;

use crate::models::{Pattern, PatternType};

fn as_numeric(values: &[serde_json::Value]) -> Vec<f64> {
    values.iter().filter_map(|v| v.as_f64()).collect()
}

fn moments(series: &[f64]) -> (f64, f64, f64, f64) {
    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    let variance = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return (mean, stddev, 0.0, 0.0);
    }
    let skewness = series.iter().map(|v| ((v - mean) / stddev).powi(3)).sum::<f64>() / n;
    let kurtosis = series.iter().map(|v| ((v - mean) / stddev).powi(4)).sum::<f64>() / n - 3.0;
    (mean, stddev, skewness, kurtosis)
}

/// Bucketed histogram used for bimodality/uniformity shape tests.
fn histogram(series: &[f64], buckets: usize) -> Vec<usize> {
    let min = series.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = (max - min).max(1e-9);
    let mut counts = vec![0usize; buckets];
    for v in series {
        let idx = (((v - min) / range) * buckets as f64).floor() as usize;
        counts[idx.min(buckets - 1)] += 1;
    }
    counts
}

fn local_maxima(histogram: &[usize]) -> usize {
    let mut peaks = 0;
    for i in 0..histogram.len() {
        let left = if i == 0 { 0 } else { histogram[i - 1] };
        let right = if i + 1 == histogram.len() { 0 } else { histogram[i + 1] };
        if histogram[i] > left && histogram[i] > right && histogram[i] > 0 {
            peaks += 1;
        }
    }
    peaks
}

/// Shape tests (normal/uniform/bimodal/power-law) over a numeric series.
pub fn detect(values: &[serde_json::Value]) -> Vec<Pattern> {
    let series = as_numeric(values);
    if series.len() < 8 {
        return Vec::new();
    }

    let (mean, stddev, skewness, kurtosis) = moments(&series);
    let mut patterns = Vec::new();

    if stddev > 0.0 {
        // Normal: low skew, kurtosis near zero (excess kurtosis of a normal
        // distribution is 0 by this definition).
        let normal_confidence = (1.0 - (skewness.abs() / 2.0 + kurtosis.abs() / 4.0).min(1.0)).max(0.0);
        if normal_confidence >= 0.5 {
            patterns.push(
                Pattern::new(PatternType::Distribution, normal_confidence, "approximately normal distribution")
                    .with_evidence("skewness", serde_json::json!(skewness))
                    .with_evidence("kurtosis", serde_json::json!(kurtosis)),
            );
        }

        let hist = histogram(&series, 10.min(series.len()));
        let expected = series.len() as f64 / hist.len() as f64;
        let chi_sq = hist.iter().map(|&c| (c as f64 - expected).powi(2) / expected.max(1e-9)).sum::<f64>();
        let uniform_confidence = (1.0 - (chi_sq / (series.len() as f64 * 2.0)).min(1.0)).max(0.0);
        if uniform_confidence >= 0.6 {
            patterns.push(
                Pattern::new(PatternType::Distribution, uniform_confidence, "approximately uniform distribution")
                    .with_evidence("chi_squared", serde_json::json!(chi_sq)),
            );
        }

        let peaks = local_maxima(&hist);
        if peaks >= 2 {
            let bimodal_confidence = (0.5 + 0.15 * peaks as f64).min(0.95);
            patterns.push(
                Pattern::new(PatternType::Distribution, bimodal_confidence, format!("{peaks} distinct modes detected"))
                    .with_evidence("peak_count", serde_json::json!(peaks)),
            );
        }

        // Power-law: heavily right-skewed with a long positive tail.
        if skewness > 2.0 && mean > 0.0 {
            let power_law_confidence = (skewness / 6.0).min(0.95).max(0.5);
            patterns.push(
                Pattern::new(PatternType::Distribution, power_law_confidence, "heavy-tailed / power-law-like distribution")
                    .with_evidence("skewness", serde_json::json!(skewness)),
            );
        }
    }

    patterns
}

/// Cardinality classification over string/categorical values: high
/// cardinality when unique/total > 0.8, per the glossary definition.
pub fn detect_categorical(values: &[serde_json::Value]) -> Vec<Pattern> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for v in values {
        if let Some(s) = v.as_str() {
            *counts.entry(s.to_string()).or_insert(0) += 1;
        }
    }
    if counts.is_empty() {
        return Vec::new();
    }
    let total = values.len() as f64;
    let unique = counts.len() as f64;
    let ratio = unique / total;

    let mut patterns = Vec::new();
    if ratio > 0.8 {
        patterns.push(
            Pattern::new(PatternType::Distribution, ratio, "high-cardinality categorical values")
                .with_evidence("unique_ratio", serde_json::json!(ratio)),
        );
    } else if ratio < 0.2 {
        let confidence = (1.0 - ratio).min(0.95);
        patterns.push(
            Pattern::new(PatternType::Distribution, confidence, "low-cardinality categorical values")
                .with_evidence("unique_ratio", serde_json::json!(ratio)),
        );
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_bimodal_shape() {
        let mut series = vec![1.0; 20];
        series.extend(vec![100.0; 20]);
        let values: Vec<serde_json::Value> = series.into_iter().map(|v| json!(v)).collect();
        let patterns = detect(&values);
        assert!(patterns.iter().any(|p| p.description.contains("modes")));
    }

    #[test]
    fn detects_high_cardinality_categorical() {
        let values: Vec<serde_json::Value> = (0..20).map(|i| json!(format!("id-{i}"))).collect();
        let patterns = detect_categorical(&values);
        assert!(patterns.iter().any(|p| p.description.contains("high-cardinality")));
    }

    #[test]
    fn detects_low_cardinality_categorical() {
        let mut values = vec![json!("active"); 18];
        values.extend(vec![json!("inactive"); 2]);
        let patterns = detect_categorical(&values);
        assert!(patterns.iter().any(|p| p.description.contains("low-cardinality")));
    }
}
