use std::collections::{BTreeSet, HashSet};

use crate::models::{Attribute, CardinalityInfo, DataType, Record, SemanticType, Statistics};
use crate::models::attribute::{NumericStatistics, Percentiles, StringStatistics};

/// Infers a `DataType` from a value the way `discoverSingleSchema` does:
/// from the first non-null observation.
pub fn infer_data_type(value: &serde_json::Value) -> DataType {
    match value {
        serde_json::Value::String(s) => {
            if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                DataType::Timestamp
            } else {
                DataType::String
            }
        }
        serde_json::Value::Number(_) => DataType::Numeric,
        serde_json::Value::Bool(_) => DataType::Boolean,
        serde_json::Value::Array(_) => DataType::Array,
        serde_json::Value::Object(_) => DataType::Json,
        serde_json::Value::Null => DataType::Unknown,
    }
}

fn infer_semantic_type(name: &str, data_type: DataType) -> Option<SemanticType> {
    let lower = name.to_lowercase();
    if data_type == DataType::Timestamp || lower == "timestamp" || lower.ends_with("_at") || lower.ends_with("time") {
        return Some(SemanticType::Timestamp);
    }
    if lower.contains("email") {
        return Some(SemanticType::Email);
    }
    if lower.contains("url") || lower.contains("uri") {
        return Some(SemanticType::Url);
    }
    if lower.contains("ip") && data_type == DataType::String {
        return Some(SemanticType::Ip);
    }
    if lower.contains("useragent") || lower.contains("user_agent") {
        return Some(SemanticType::UserAgent);
    }
    if name.ends_with("Id") || name.ends_with("ID") || name.ends_with("id") {
        return Some(SemanticType::Id);
    }
    if data_type == DataType::Numeric {
        return Some(SemanticType::Metric);
    }
    if data_type == DataType::String {
        return Some(SemanticType::Category);
    }
    None
}

/// Builds the attribute list for `discoverSingleSchema`/`profileSchema`
/// basic depth: union of keys across records, type from the first non-null
/// value seen for each key, cardinality and null ratio over the sample.
pub fn infer_attributes(records: &[Record]) -> Vec<Attribute> {
    let mut names: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.clone()) {
                names.push(key.clone());
            }
        }
    }

    let total = records.len() as u64;
    names
        .into_iter()
        .map(|name| {
            let mut data_type = DataType::Unknown;
            let mut unique = HashSet::new();
            let mut present_non_null = 0u64;
            for record in records {
                match record.get(&name) {
                    Some(v) if !v.is_null() => {
                        if data_type == DataType::Unknown {
                            data_type = infer_data_type(v);
                        }
                        present_non_null += 1;
                        unique.insert(v.to_string());
                    }
                    _ => {}
                }
            }
            let null_ratio = if total == 0 { 0.0 } else { 1.0 - (present_non_null as f64 / total as f64) };
            let mut attr = Attribute::new(&name, data_type);
            attr.semantic_type = infer_semantic_type(&name, data_type);
            attr.cardinality = CardinalityInfo::new(unique.len() as u64, present_non_null);
            attr.null_ratio = null_ratio;
            attr
        })
        .collect()
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// `standard` depth per-attribute statistics: numeric min/max/mean/median/
/// stddev/p50/p90/p99, or string length/distinct-count stats.
pub fn compute_statistics(data_type: DataType, values: &[&serde_json::Value]) -> Option<Statistics> {
    match data_type {
        DataType::Numeric => {
            let mut nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            if nums.is_empty() {
                return None;
            }
            nums.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let min = nums[0];
            let max = nums[nums.len() - 1];
            let mean = nums.iter().sum::<f64>() / nums.len() as f64;
            let median = percentile(&nums, 0.5);
            let variance = nums.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nums.len() as f64;
            Some(Statistics::Numeric(NumericStatistics {
                min,
                max,
                mean,
                median,
                stddev: variance.sqrt(),
                percentiles: Percentiles { p50: percentile(&nums, 0.5), p90: percentile(&nums, 0.9), p99: percentile(&nums, 0.99) },
            }))
        }
        DataType::String => {
            let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
            if strings.is_empty() {
                return None;
            }
            let lengths: Vec<usize> = strings.iter().map(|s| s.len()).collect();
            let distinct: HashSet<&str> = strings.iter().copied().collect();
            Some(Statistics::Strings(StringStatistics {
                min_length: *lengths.iter().min().unwrap(),
                max_length: *lengths.iter().max().unwrap(),
                avg_length: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
                empty_count: strings.iter().filter(|s| s.is_empty()).count() as u64,
                distinct_count: distinct.len() as u64,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn infers_types_from_first_non_null_value() {
        let records = vec![
            record(&[("amount", json!(12.5)), ("customerId", json!("abc"))]),
            record(&[("amount", json!(9.0)), ("customerId", json!("def"))]),
        ];
        let attrs = infer_attributes(&records);
        let amount = attrs.iter().find(|a| a.name == "amount").unwrap();
        assert_eq!(amount.data_type, DataType::Numeric);
        let customer_id = attrs.iter().find(|a| a.name == "customerId").unwrap();
        assert_eq!(customer_id.semantic_type, Some(SemanticType::Id));
    }

    #[test]
    fn null_ratio_accounts_for_missing_and_null_values() {
        let records = vec![
            record(&[("x", json!(1))]),
            record(&[("x", serde_json::Value::Null)]),
            record(&[]),
        ];
        let attrs = infer_attributes(&records);
        let x = attrs.iter().find(|a| a.name == "x").unwrap();
        assert!((x.null_ratio - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn numeric_statistics_computed_over_sorted_values() {
        let values: Vec<serde_json::Value> = (1..=10).map(|i| json!(i as f64)).collect();
        let refs: Vec<&serde_json::Value> = values.iter().collect();
        let stats = compute_statistics(DataType::Numeric, &refs).unwrap();
        match stats {
            Statistics::Numeric(n) => {
                assert_eq!(n.min, 1.0);
                assert_eq!(n.max, 10.0);
                assert!((n.mean - 5.5).abs() < 1e-9);
            }
            _ => panic!("expected numeric statistics"),
        }
    }
}
