use regex::Regex;
use std::sync::OnceLock;

use crate::models::{Pattern, PatternType};

struct FormatClass {
    name: &'static str,
    pattern: fn() -> &'static Regex,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^\s]+$").unwrap())
}

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").unwrap()
    })
}

fn ipv4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap())
}

fn numeric_string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap())
}

fn classes() -> &'static [FormatClass] {
    static CLASSES: OnceLock<Vec<FormatClass>> = OnceLock::new();
    CLASSES.get_or_init(|| {
        vec![
            FormatClass { name: "uuid", pattern: uuid_re },
            FormatClass { name: "email", pattern: email_re },
            FormatClass { name: "url", pattern: url_re },
            FormatClass { name: "ipv4", pattern: ipv4_re },
            FormatClass { name: "numeric_string", pattern: numeric_string_re },
        ]
    })
}

fn classify(value: &str) -> Option<&'static str> {
    if serde_json::from_str::<serde_json::Value>(value).is_ok_and(|v| v.is_object() || v.is_array()) {
        return Some("json");
    }
    classes().iter().find(|c| (c.pattern)().is_match(value)).map(|c| c.name)
}

/// Regex-based format classification over string values: a format pattern
/// is emitted when one class covers >= 90% of non-null values; otherwise a
/// mixed-format finding is emitted.
pub fn detect(values: &[serde_json::Value]) -> Vec<Pattern> {
    let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
    if strings.is_empty() {
        return Vec::new();
    }

    let mut counts: std::collections::HashMap<&'static str, usize> = std::collections::HashMap::new();
    let mut unclassified = 0usize;
    for s in &strings {
        match classify(s) {
            Some(class) => *counts.entry(class).or_insert(0) += 1,
            None => unclassified += 1,
        }
    }

    let total = strings.len() as f64;
    if let Some((&class, &count)) = counts.iter().max_by_key(|(_, &c)| c) {
        let ratio = count as f64 / total;
        if ratio >= 0.9 {
            return vec![Pattern::new(
                PatternType::Format,
                ratio,
                format!("{class} format, {count}/{} values match", strings.len()),
            )
            .with_evidence("class", serde_json::json!(class))
            .with_evidence("match_ratio", serde_json::json!(ratio))];
        }
    }

    let distinct_classes = counts.len() + usize::from(unclassified > 0);
    if distinct_classes > 1 {
        let confidence = (1.0 - counts.values().max().copied().unwrap_or(0) as f64 / total).clamp(0.0, 1.0);
        return vec![Pattern::new(PatternType::MixedFormat, confidence.max(0.5), "mixed value formats")
            .with_evidence("classes_seen", serde_json::json!(counts.keys().collect::<Vec<_>>()))];
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_email_format() {
        let values: Vec<serde_json::Value> = (0..10).map(|i| json!(format!("user{i}@example.com"))).collect();
        let patterns = detect(&values);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, PatternType::Format);
    }

    #[test]
    fn detects_uuid_format() {
        let values = vec![
            json!("550e8400-e29b-41d4-a716-446655440000"),
            json!("550e8400-e29b-41d4-a716-446655440001"),
            json!("550e8400-e29b-41d4-a716-446655440002"),
        ];
        let patterns = detect(&values);
        assert!(patterns.iter().any(|p| p.description.contains("uuid")));
    }

    #[test]
    fn mixed_formats_yield_mixed_finding() {
        let values = vec![json!("user@example.com"), json!("not-an-email-at-all"), json!("192.168.1.1")];
        let patterns = detect(&values);
        assert!(patterns.iter().any(|p| p.pattern_type == PatternType::MixedFormat));
    }
}
