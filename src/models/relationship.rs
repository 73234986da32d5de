use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Join,
    Temporal,
    Correlation,
    Hierarchy,
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinType {
    OneToOne,
    OneToMany,
    ManyToMany,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinKeys {
    pub source_key: String,
    pub target_key: String,
    pub join_type: JoinType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub value: serde_json::Value,
    pub confidence: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub source_schema: String,
    pub target_schema: String,
    pub source_attribute: Option<String>,
    pub target_attribute: Option<String>,
    pub join_keys: Option<JoinKeys>,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
}

impl Relationship {
    pub fn new(
        relationship_type: RelationshipType,
        source_schema: impl Into<String>,
        target_schema: impl Into<String>,
    ) -> Self {
        Relationship {
            id: Uuid::new_v4().to_string(),
            relationship_type,
            source_schema: source_schema.into(),
            target_schema: target_schema.into(),
            source_attribute: None,
            target_attribute: None,
            join_keys: None,
            confidence: 0.0,
            evidence: Vec::new(),
        }
    }

    pub fn with_attributes(
        mut self,
        source_attribute: impl Into<String>,
        target_attribute: impl Into<String>,
    ) -> Self {
        self.source_attribute = Some(source_attribute.into());
        self.target_attribute = Some(target_attribute.into());
        self
    }

    pub fn with_evidence(mut self, ev: Evidence) -> Self {
        self.evidence.push(ev);
        // Confidence is monotone non-decreasing in evidence count: each new
        // piece of evidence can only raise the floor, never lower it.
        self.confidence = self.confidence.max(recompute_confidence(&self.evidence));
        self
    }
}

/// Weighted average of evidence confidences, scaled up slightly as more
/// independent evidence accumulates (capped at 1.0) so that confidence is
/// monotone non-decreasing in evidence count.
fn recompute_confidence(evidence: &[Evidence]) -> f64 {
    if evidence.is_empty() {
        return 0.0;
    }
    let avg: f64 = evidence.iter().map(|e| e.confidence).sum::<f64>() / evidence.len() as f64;
    let boost = 1.0 + 0.05 * (evidence.len() as f64 - 1.0);
    (avg * boost).min(1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinabilityResult {
    pub ratio: f64,
    pub one_to_n: bool,
    pub overlap: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<Relationship>,
    pub hubs: Vec<String>,
    pub average_degree: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_monotone_in_evidence_count() {
        let mut rel = Relationship::new(RelationshipType::Join, "Orders", "Customers");
        rel = rel.with_evidence(Evidence {
            evidence_type: "overlap".into(),
            value: serde_json::json!(0.5),
            confidence: 0.5,
            description: "50% key overlap".into(),
        });
        let c1 = rel.confidence;
        rel = rel.with_evidence(Evidence {
            evidence_type: "name_similarity".into(),
            value: serde_json::json!("customerId"),
            confidence: 0.6,
            description: "matching id-like name".into(),
        });
        let c2 = rel.confidence;
        assert!(c2 >= c1);
    }
}
