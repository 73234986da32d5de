use chrono::{DateTime, Utc};

use crate::context::Context;
use crate::error::Result;
use crate::models::{
    Attribute, DataSample, DataType, DimensionKind, Issue, QualityDimension, QualityReport,
    Schema, Severity,
};

pub struct QualityWeights {
    pub completeness: f64,
    pub consistency: f64,
    pub timeliness: f64,
    pub uniqueness: f64,
    pub validity: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        QualityWeights {
            completeness: 0.25,
            consistency: 0.25,
            timeliness: 0.20,
            uniqueness: 0.15,
            validity: 0.15,
        }
    }
}

impl QualityWeights {
    fn weight(&self, kind: DimensionKind) -> f64 {
        match kind {
            DimensionKind::Completeness => self.completeness,
            DimensionKind::Consistency => self.consistency,
            DimensionKind::Timeliness => self.timeliness,
            DimensionKind::Uniqueness => self.uniqueness,
            DimensionKind::Validity => self.validity,
        }
    }

    fn sum(&self) -> f64 {
        self.completeness + self.consistency + self.timeliness + self.uniqueness + self.validity
    }
}

/// Per-attribute quality breakdown returned by `assess_attribute`.
#[derive(Debug, Clone)]
pub struct AttributeQuality {
    pub attribute: String,
    pub completeness: f64,
    pub validity: f64,
    pub notes: Vec<String>,
}

/// Threshold below which an attribute's average reporting delay is
/// considered timely, in seconds. No config knob exists for this, so it's
/// fixed at a conservative five minutes.
const TIMELINESS_THRESHOLD_SECS: f64 = 300.0;

/// Scores the five quality dimensions over a sample and produces issues +
/// recommendations.
pub struct QualityAssessor {
    weights: QualityWeights,
}

impl QualityAssessor {
    pub fn new(weights: QualityWeights) -> Self {
        debug_assert!((weights.sum() - 1.0).abs() < 1e-6, "quality weights must sum to 1.0");
        QualityAssessor { weights }
    }

    pub async fn assess_schema(&self, _ctx: &Context, schema: &Schema, sample: &DataSample) -> Result<QualityReport> {
        let mut dimensions = Vec::new();
        let mut issues = Vec::new();

        let (completeness, completeness_notes) = self.score_completeness(schema, sample);
        push_dimension(&mut dimensions, &mut issues, DimensionKind::Completeness, completeness, completeness_notes, &self.weights, 0.9);

        let (consistency, consistency_notes) = self.score_consistency(schema, sample);
        push_dimension(&mut dimensions, &mut issues, DimensionKind::Consistency, consistency, consistency_notes, &self.weights, 0.9);

        let (timeliness, timeliness_notes) = self.score_timeliness(schema, sample);
        push_dimension(&mut dimensions, &mut issues, DimensionKind::Timeliness, timeliness, timeliness_notes, &self.weights, 0.9);

        let (uniqueness, uniqueness_notes) = self.score_uniqueness(schema, sample);
        push_dimension(&mut dimensions, &mut issues, DimensionKind::Uniqueness, uniqueness, uniqueness_notes, &self.weights, 0.9);

        let (validity, validity_notes) = self.score_validity(schema, sample);
        push_dimension(&mut dimensions, &mut issues, DimensionKind::Validity, validity, validity_notes, &self.weights, 0.9);

        let overall_score = dimensions.iter().map(|d| d.score * d.weight).sum();

        let mut report = QualityReport {
            schema_name: schema.name.clone(),
            assessed_at: Utc::now(),
            sample_size: sample.sample_size,
            time_range: sample.time_range,
            dimensions,
            overall_score,
            issues,
            recommendations: Vec::new(),
        };
        report.recommendations = self.generate_recommendations(&report);
        Ok(report)
    }

    fn score_completeness(&self, schema: &Schema, sample: &DataSample) -> (f64, Vec<String>) {
        if schema.attributes.is_empty() || sample.is_empty() {
            return (1.0, vec!["no attributes to assess".to_string()]);
        }
        let mut missing = 0usize;
        let mut total = 0usize;
        for attr in &schema.attributes {
            for record in &sample.records {
                total += 1;
                let is_missing = match record.get(&attr.name) {
                    None => true,
                    Some(v) if v.is_null() => true,
                    Some(serde_json::Value::String(s)) if s.is_empty() => true,
                    _ => false,
                };
                if is_missing {
                    missing += 1;
                }
            }
        }
        let score = if total == 0 { 1.0 } else { 1.0 - missing as f64 / total as f64 };
        (score.clamp(0.0, 1.0), Vec::new())
    }

    fn score_consistency(&self, schema: &Schema, sample: &DataSample) -> (f64, Vec<String>) {
        let mut inconsistent = 0usize;
        let mut total_checks = 0usize;

        for attr in &schema.attributes {
            let values = sample.values_for(&attr.name);
            if values.is_empty() {
                continue;
            }
            match attr.data_type {
                DataType::String => {
                    let classes: std::collections::HashSet<&'static str> =
                        values.iter().filter_map(|v| v.as_str()).map(classify_shape).collect();
                    total_checks += 1;
                    if classes.len() > 1 {
                        inconsistent += 1;
                    }
                }
                DataType::Numeric => {
                    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                    if numbers.len() < 2 {
                        continue;
                    }
                    let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
                    let variance = numbers.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / numbers.len() as f64;
                    let stddev = variance.sqrt();
                    total_checks += numbers.len();
                    if stddev > 0.0 {
                        inconsistent += numbers.iter().filter(|v| ((*v - mean) / stddev).abs() > 3.0).count();
                    }
                }
                _ => {}
            }
        }

        if total_checks == 0 {
            return (1.0, vec!["no attributes had enough values to check consistency".to_string()]);
        }
        let score = 1.0 - inconsistent as f64 / total_checks as f64;
        (score.clamp(0.0, 1.0), Vec::new())
    }

    fn score_timeliness(&self, schema: &Schema, sample: &DataSample) -> (f64, Vec<String>) {
        let timestamp_attr = schema.attributes.iter().find(|a| a.data_type == DataType::Timestamp);
        let Some(attr) = timestamp_attr else {
            return (0.5, vec!["no timestamp attribute present".to_string()]);
        };

        let delays: Vec<f64> = sample
            .values_for(&attr.name)
            .into_iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| (Utc::now() - ts.with_timezone(&Utc)).num_seconds().max(0) as f64)
            .collect();

        if delays.is_empty() {
            return (0.5, vec!["timestamp attribute present but unparseable".to_string()]);
        }
        let avg_delay = delays.iter().sum::<f64>() / delays.len() as f64;
        let score = if avg_delay <= TIMELINESS_THRESHOLD_SECS {
            1.0
        } else {
            TIMELINESS_THRESHOLD_SECS / avg_delay
        };
        (score.clamp(0.0, 1.0), Vec::new())
    }

    fn score_uniqueness(&self, schema: &Schema, sample: &DataSample) -> (f64, Vec<String>) {
        let id_attrs: Vec<&Attribute> = schema.attributes.iter().filter(|a| a.is_id_like()).collect();
        if id_attrs.is_empty() {
            return (1.0, vec!["no ID-like attribute present".to_string()]);
        }

        let mut duplicates = 0usize;
        let mut total = 0usize;
        for attr in id_attrs {
            let values = sample.values_for(&attr.name);
            total += values.len();
            let mut seen = std::collections::HashSet::new();
            for v in values {
                let key = v.to_string();
                if !seen.insert(key) {
                    duplicates += 1;
                }
            }
        }
        if total == 0 {
            return (1.0, vec!["ID-like attribute present but no observed values".to_string()]);
        }
        let score = 1.0 - duplicates as f64 / total as f64;
        (score.clamp(0.0, 1.0), Vec::new())
    }

    fn score_validity(&self, schema: &Schema, sample: &DataSample) -> (f64, Vec<String>) {
        let mut invalid = 0usize;
        let mut total = 0usize;
        for attr in &schema.attributes {
            for value in sample.values_for(&attr.name) {
                total += 1;
                if !matches_type_predicate(value, attr.data_type) {
                    invalid += 1;
                }
            }
        }
        if total == 0 {
            return (1.0, vec!["no values to validate".to_string()]);
        }
        let score = 1.0 - invalid as f64 / total as f64;
        (score.clamp(0.0, 1.0), Vec::new())
    }

    /// Breaks a single attribute out for standalone assessment, independent
    /// of a full schema-level `QualityReport`.
    pub fn assess_attribute(&self, attr: &Attribute, values: &[serde_json::Value]) -> AttributeQuality {
        let total = values.len().max(1);
        let missing = values.iter().filter(|v| v.is_null()).count();
        let invalid = values.iter().filter(|v| !matches_type_predicate(v, attr.data_type)).count();
        let mut notes = Vec::new();
        if values.is_empty() {
            notes.push("no observed values".to_string());
        }
        AttributeQuality {
            attribute: attr.name.clone(),
            completeness: (1.0 - missing as f64 / total as f64).clamp(0.0, 1.0),
            validity: (1.0 - invalid as f64 / total as f64).clamp(0.0, 1.0),
            notes,
        }
    }

    /// Free-text follow-ups derived from the lowest-scoring dimensions and
    /// any issues at high/critical severity.
    pub fn generate_recommendations(&self, report: &QualityReport) -> Vec<String> {
        let mut recs = Vec::new();
        for issue in &report.issues {
            if issue.severity >= Severity::High {
                recs.push(issue.resolution.clone());
            }
        }
        if let Some(worst) = report
            .dimensions
            .iter()
            .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
        {
            if worst.score < 0.7 {
                recs.push(format!("prioritize improving {:?} (currently {:.2})", worst.kind, worst.score));
            }
        }
        if recs.is_empty() {
            recs.push("no significant quality issues detected".to_string());
        }
        recs
    }
}

fn push_dimension(
    dimensions: &mut Vec<QualityDimension>,
    issues: &mut Vec<Issue>,
    kind: DimensionKind,
    score: f64,
    notes: Vec<String>,
    weights: &QualityWeights,
    threshold: f64,
) {
    dimensions.push(QualityDimension {
        kind,
        score,
        weight: weights.weight(kind),
        notes: notes.clone(),
    });
    if score < threshold {
        let deviation = threshold - score;
        issues.push(Issue {
            dimension: kind,
            severity: Severity::from_deviation(deviation),
            description: format!("{kind:?} score {score:.2} is below the {threshold:.2} target"),
            impact: notes.first().cloned().unwrap_or_else(|| format!("{kind:?} below target")),
            resolution: format!("investigate {kind:?} issues for this schema"),
        });
    }
}

fn classify_shape(s: &str) -> &'static str {
    if s.parse::<f64>().is_ok() {
        "numeric_string"
    } else if s.contains('@') {
        "email"
    } else if s.starts_with("http://") || s.starts_with("https://") {
        "url"
    } else {
        "text"
    }
}

fn matches_type_predicate(value: &serde_json::Value, data_type: DataType) -> bool {
    match data_type {
        DataType::String => value.is_string(),
        DataType::Numeric => value.is_number() || value.as_str().map(|s| s.parse::<f64>().is_ok()).unwrap_or(false),
        DataType::Boolean => value.is_boolean(),
        DataType::Timestamp => value.as_str().map(|s| DateTime::parse_from_rfc3339(s).is_ok()).unwrap_or(false),
        DataType::Array => value.is_array(),
        DataType::Json => value.is_object() || value.is_array(),
        DataType::Unknown => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CardinalityInfo, Record, TimeRange};

    fn schema_with(attrs: Vec<Attribute>) -> Schema {
        let mut s = Schema::new("Transaction");
        s.attributes = attrs;
        s
    }

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn low_quality_sample_scores_below_point_eight() {
        let mut name_attr = Attribute::new("name", DataType::String);
        name_attr.cardinality = CardinalityInfo::new(10, 10);
        let mut id_attr = Attribute::new("id", DataType::String);
        id_attr.semantic_type = Some(crate::models::SemanticType::Id);
        let mut email_attr = Attribute::new("email", DataType::String);
        email_attr.cardinality = CardinalityInfo::new(10, 10);

        let schema = schema_with(vec![name_attr, id_attr, email_attr]);

        let mut records = Vec::new();
        for i in 0..20 {
            let name = if i < 2 { serde_json::Value::Null } else { serde_json::json!("Alice") };
            let id = if i < 1 { serde_json::json!("dup") } else { serde_json::json!(format!("id-{i}")) };
            let email = if i < 2 { serde_json::json!("not-an-email") } else { serde_json::json!("a@b.com") };
            records.push(record(&[("name", name), ("id", id), ("email", email)]));
        }
        // force a duplicate id
        records[1].insert("id".into(), serde_json::json!("dup"));

        let sample = DataSample::new("Transaction", records, 1.0, "uniform", TimeRange::last(chrono::Duration::hours(1)));
        let assessor = QualityAssessor::new(QualityWeights::default());
        let ctx = Context::background();
        let report = assessor.assess_schema(&ctx, &schema, &sample).await.unwrap();

        assert!(report.overall_score < 0.8, "expected overall_score < 0.8, got {}", report.overall_score);
        assert!(report.issues.iter().any(|i| i.dimension == DimensionKind::Uniqueness));
    }

    #[test]
    fn weights_default_sums_to_one() {
        let w = QualityWeights::default();
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }
}
