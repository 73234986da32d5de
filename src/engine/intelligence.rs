use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Pattern, Relationship, Schema};

use super::SchemaFilter;

/// Free-text goal hints passed to `discoverWithIntelligence`. `domain`,
/// when it matches a known preset, contributes its event types to the
/// built filter alongside the keyword patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntelligenceHints {
    pub keywords: Vec<String>,
    pub purpose: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSeverity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub severity: InsightSeverity,
    pub schema: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Planned,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub name: String,
    pub status: StepStatus,
    pub estimated_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<ExecutionStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub schemas: Vec<Schema>,
    pub patterns: Vec<Pattern>,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<String>,
    pub execution_plan: ExecutionPlan,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Domain presets: a purpose-ish name maps to the event types that preset
/// is usually about.
pub fn domain_preset(domain: &str) -> Option<&'static [&'static str]> {
    match domain {
        "performance" => Some(&["Transaction", "PageView", "Synthetics"]),
        "infrastructure" => Some(&["SystemSample", "ProcessSample", "NetworkSample"]),
        "logs" => Some(&["Log", "LogEntry"]),
        _ => None,
    }
}

/// Builds the filter `discoverWithIntelligence` hands to `discoverSchemas`:
/// keywords become `*keyword*` include patterns, and a recognized domain
/// preset contributes its event types directly.
pub fn build_intelligent_filter(hints: &IntelligenceHints, max_schemas: usize) -> (SchemaFilter, usize) {
    let mut include_patterns: Vec<String> = hints.keywords.iter().map(|k| format!("*{k}*")).collect();
    let mut event_types = Vec::new();
    if let Some(domain) = hints.domain.as_deref().and_then(domain_preset) {
        event_types.extend(domain.iter().map(|s| s.to_string()));
    }
    if !event_types.is_empty() && include_patterns.is_empty() {
        include_patterns.push("*".to_string());
    }
    let keyword_count = hints.keywords.len();
    let filter = SchemaFilter {
        max_schemas,
        min_record_count: None,
        event_types: if event_types.is_empty() { None } else { Some(event_types) },
        include_patterns,
        exclude_patterns: Vec::new(),
    };
    (filter, keyword_count)
}

/// `score = 10*matchedKeywordCount + volume/1e6 + 5*quality + |patterns|`.
pub fn score_schema(schema: &Schema, keywords: &[String]) -> f64 {
    let matched = keywords
        .iter()
        .filter(|k| schema.event_type.to_lowercase().contains(&k.to_lowercase()))
        .count();
    let volume = schema.volume.total_records as f64 / 1_000_000.0;
    let quality = schema.quality.overall.unwrap_or(schema.quality.completeness);
    let patterns = schema.patterns.len() as f64;
    10.0 * matched as f64 + volume + 5.0 * quality + patterns
}

/// Stable-sorts schemas by `score_schema` descending.
pub fn rank_schemas(mut schemas: Vec<Schema>, keywords: &[String]) -> Vec<Schema> {
    schemas.sort_by(|a, b| {
        score_schema(b, keywords)
            .partial_cmp(&score_schema(a, keywords))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    schemas
}

/// Cross-schema signals surfaced as insights: low quality, high-cardinality
/// attributes worth flagging for cost, and join candidates from the
/// relationship miner.
pub fn build_insights(schemas: &[Schema], relationships: &[Relationship]) -> Vec<Insight> {
    let mut insights = Vec::new();
    for schema in schemas {
        let quality = schema.quality.overall.unwrap_or(schema.quality.completeness);
        if quality < 0.7 {
            insights.push(Insight {
                severity: InsightSeverity::Warning,
                schema: schema.event_type.clone(),
                message: format!("quality score {quality:.2} is below the 0.7 threshold"),
            });
        }
        for attr in &schema.attributes {
            if attr.cardinality.is_high_cardinality() {
                insights.push(Insight {
                    severity: InsightSeverity::Info,
                    schema: schema.event_type.clone(),
                    message: format!(
                        "attribute \"{}\" has high cardinality (ratio {:.2}); consider excluding it from broad aggregations",
                        attr.name,
                        attr.cardinality.ratio()
                    ),
                });
            }
        }
    }
    for rel in relationships {
        if rel.relationship_type == crate::models::RelationshipType::Join {
            insights.push(Insight {
                severity: InsightSeverity::Info,
                schema: rel.source_schema.clone(),
                message: format!(
                    "join candidate: {} {:?} -> {} {:?} (confidence {:.2})",
                    rel.source_schema, rel.source_attribute, rel.target_schema, rel.confidence, rel.target_attribute
                ),
            });
        }
    }
    insights
}

/// A fixed named plan: the steps `discoverWithIntelligence` actually runs,
/// in order, each reported `Completed` once this function is called after
/// the corresponding work finished (the engine runs the steps sequentially
/// so there's never a `Failed` step by the time the plan is built).
pub fn build_execution_plan(schema_count: usize, relationship_count: usize) -> ExecutionPlan {
    ExecutionPlan {
        steps: vec![
            ExecutionStep { name: "discover_schemas".into(), status: StepStatus::Completed, estimated_duration_ms: 200 + schema_count as u64 * 20 },
            ExecutionStep { name: "detect_patterns".into(), status: StepStatus::Completed, estimated_duration_ms: 50 + schema_count as u64 * 10 },
            ExecutionStep { name: "mine_relationships".into(), status: StepStatus::Completed, estimated_duration_ms: 100 + relationship_count as u64 * 5 },
            ExecutionStep { name: "rank_and_summarize".into(), status: StepStatus::Completed, estimated_duration_ms: 20 },
        ],
    }
}
