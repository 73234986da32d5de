use crate::models::{Pattern, PatternType};

fn as_numeric(values: &[serde_json::Value]) -> Vec<f64> {
    values.iter().filter_map(|v| v.as_f64()).collect()
}

/// Arithmetic-progression and monotonicity detectors over a numeric
/// series.
pub fn detect_numeric(values: &[serde_json::Value]) -> Vec<Pattern> {
    let series = as_numeric(values);
    if series.len() < 3 {
        return Vec::new();
    }

    let mut patterns = Vec::new();
    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let first_diff = diffs[0];
    if first_diff != 0.0 {
        let matching = diffs.iter().filter(|d| (*d - first_diff).abs() < 1e-6).count();
        let ratio = matching as f64 / diffs.len() as f64;
        if ratio >= 0.9 {
            patterns.push(
                Pattern::new(PatternType::Sequence, ratio, format!("arithmetic progression, step {first_diff:.4}"))
                    .with_evidence("step", serde_json::json!(first_diff)),
            );
        }
    }

    let increasing = diffs.iter().filter(|d| **d >= 0.0).count();
    let decreasing = diffs.iter().filter(|d| **d <= 0.0).count();
    let monotone_ratio = increasing.max(decreasing) as f64 / diffs.len() as f64;
    if monotone_ratio >= 0.9 {
        let direction = if increasing >= decreasing { "increasing" } else { "decreasing" };
        patterns.push(
            Pattern::new(PatternType::Sequence, monotone_ratio, format!("monotonically {direction} sequence"))
                .with_evidence("direction", serde_json::json!(direction)),
        );
    }

    patterns
}

fn longest_common_prefix<'a>(a: &'a str, b: &'a str) -> &'a str {
    let len = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
    &a[..a.char_indices().nth(len).map(|(i, _)| i).unwrap_or(a.len())]
}

fn longest_common_suffix(a: &str, b: &str) -> usize {
    a.chars().rev().zip(b.chars().rev()).take_while(|(x, y)| x == y).count()
}

/// Repeating-prefix/suffix detector over string values, e.g. shared
/// namespace prefixes (`"order.created"`, `"order.shipped"`) or shared
/// file-extension suffixes.
pub fn detect_strings(values: &[serde_json::Value]) -> Vec<Pattern> {
    let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
    if strings.len() < 3 {
        return Vec::new();
    }

    let mut patterns = Vec::new();

    let mut prefix = strings[0];
    for s in &strings[1..] {
        prefix = longest_common_prefix(prefix, s);
        if prefix.is_empty() {
            break;
        }
    }
    if prefix.len() >= 2 {
        let confidence = (prefix.len() as f64 / strings.iter().map(|s| s.len()).sum::<usize>() as f64 * strings.len() as f64)
            .clamp(0.0, 1.0)
            .max(0.7);
        patterns.push(
            Pattern::new(PatternType::Sequence, confidence, format!("shared prefix \"{prefix}\""))
                .with_evidence("prefix", serde_json::json!(prefix)),
        );
    }

    let mut suffix_len = strings[0].len();
    for window in strings.windows(2) {
        suffix_len = suffix_len.min(longest_common_suffix(window[0], window[1]));
        if suffix_len == 0 {
            break;
        }
    }
    if suffix_len >= 2 {
        let suffix: String = strings[0].chars().rev().take(suffix_len).collect::<Vec<_>>().into_iter().rev().collect();
        patterns.push(
            Pattern::new(PatternType::Sequence, 0.75, format!("shared suffix \"{suffix}\""))
                .with_evidence("suffix", serde_json::json!(suffix)),
        );
    }

    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_arithmetic_progression() {
        let values: Vec<serde_json::Value> = (0..10).map(|i| json!(i as f64 * 5.0)).collect();
        let patterns = detect_numeric(&values);
        assert!(patterns.iter().any(|p| p.description.contains("arithmetic")));
    }

    #[test]
    fn detects_monotone_sequence() {
        let mut series: Vec<f64> = (0..20).map(|i| i as f64).collect();
        series[10] = series[9] - 0.5; // one dip, still mostly increasing
        let values: Vec<serde_json::Value> = series.into_iter().map(|v| json!(v)).collect();
        let patterns = detect_numeric(&values);
        assert!(patterns.iter().any(|p| p.description.contains("increasing")));
    }

    #[test]
    fn detects_shared_prefix() {
        let values = vec![json!("order.created"), json!("order.shipped"), json!("order.cancelled")];
        let patterns = detect_strings(&values);
        assert!(patterns.iter().any(|p| p.description.contains("prefix")));
    }
}
