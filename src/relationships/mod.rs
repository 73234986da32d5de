use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backend::BackendClient;
use crate::context::Context;
use crate::error::Result;
use crate::models::{
    Attribute, DataSample, Evidence, JoinKeys, JoinType, JoinabilityResult, Relationship,
    RelationshipGraph, RelationshipType, Schema,
};

/// A schema paired with the sample it was profiled from — what the miner
/// actually needs to mine relationships, since attribute statistics alone
/// don't carry raw values for correlation.
pub struct ProfiledSchema<'a> {
    pub schema: &'a Schema,
    pub sample: &'a DataSample,
}

#[derive(Debug, Clone)]
pub struct AttributeRef {
    pub event_type: String,
    pub attribute: String,
}

pub struct RelationshipMinerConfig {
    pub min_correlation: f64,
    pub min_sample_size: usize,
    pub max_join_candidates: usize,
}

impl Default for RelationshipMinerConfig {
    fn default() -> Self {
        RelationshipMinerConfig {
            min_correlation: 0.7,
            min_sample_size: 100,
            max_join_candidates: 50,
        }
    }
}

/// Join/temporal/correlation/hierarchy/semantic relationship mining plus
/// graph analysis over a set of profiled schemas.
pub struct RelationshipMiner {
    backend: Arc<dyn BackendClient>,
    config: RelationshipMinerConfig,
}

impl RelationshipMiner {
    pub fn new(backend: Arc<dyn BackendClient>, config: RelationshipMinerConfig) -> Self {
        RelationshipMiner { backend, config }
    }

    pub async fn find_relationships(&self, ctx: &Context, schemas: &[ProfiledSchema<'_>]) -> Result<Vec<Relationship>> {
        let mut relationships = Vec::new();
        let mut per_schema_count: HashMap<String, usize> = HashMap::new();

        for i in 0..schemas.len() {
            for j in 0..schemas.len() {
                if i == j {
                    continue;
                }
                ctx.check()?;
                let source = &schemas[i];
                let target = &schemas[j];

                for rel in self.join_candidates(ctx, source, target).await? {
                    push_bounded(&mut relationships, &mut per_schema_count, rel, self.config.max_join_candidates);
                }
                for rel in self.temporal_candidates(source, target) {
                    push_bounded(&mut relationships, &mut per_schema_count, rel, self.config.max_join_candidates);
                }
                for rel in self.correlation_candidates(source, target) {
                    push_bounded(&mut relationships, &mut per_schema_count, rel, self.config.max_join_candidates);
                }
                if let Some(rel) = self.hierarchy_candidate(source, target) {
                    push_bounded(&mut relationships, &mut per_schema_count, rel, self.config.max_join_candidates);
                }
            }
        }

        relationships.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        Ok(relationships)
    }

    async fn join_candidates(&self, ctx: &Context, source: &ProfiledSchema<'_>, target: &ProfiledSchema<'_>) -> Result<Vec<Relationship>> {
        let mut out = Vec::new();
        for sattr in &source.schema.attributes {
            if !sattr.is_id_like() {
                continue;
            }
            for tattr in &target.schema.attributes {
                if !tattr.is_id_like() || tattr.data_type != sattr.data_type {
                    continue;
                }
                ctx.check()?;
                let joinability = self
                    .test_joinability(
                        ctx,
                        &AttributeRef { event_type: source.schema.event_type.clone(), attribute: sattr.name.clone() },
                        &AttributeRef { event_type: target.schema.event_type.clone(), attribute: tattr.name.clone() },
                    )
                    .await?;

                let name_similarity = if sattr.name == tattr.name { 1.0 } else { 0.0 };
                let cardinality_match = 1.0 - (sattr.cardinality.ratio() - tattr.cardinality.ratio()).abs();
                let confidence = (joinability.overlap * 0.5 + cardinality_match * 0.25 + name_similarity * 0.25).clamp(0.0, 1.0);

                if confidence >= self.config.min_correlation {
                    let join_type = if joinability.one_to_n { JoinType::OneToMany } else { JoinType::OneToOne };
                    let rel = Relationship::new(RelationshipType::Join, &source.schema.event_type, &target.schema.event_type)
                        .with_attributes(sattr.name.clone(), tattr.name.clone());
                    let mut rel = Relationship {
                        join_keys: Some(JoinKeys {
                            source_key: sattr.name.clone(),
                            target_key: tattr.name.clone(),
                            join_type,
                        }),
                        ..rel
                    };
                    rel = rel.with_evidence(Evidence {
                        evidence_type: "overlap".into(),
                        value: serde_json::json!(joinability.overlap),
                        confidence: joinability.overlap,
                        description: format!("{:.0}% key overlap", joinability.overlap * 100.0),
                    });
                    rel = rel.with_evidence(Evidence {
                        evidence_type: "name_similarity".into(),
                        value: serde_json::json!(name_similarity),
                        confidence: name_similarity,
                        description: "attribute name comparison".into(),
                    });
                    out.push(rel);
                }
            }
        }
        Ok(out)
    }

    /// Bounded cardinality/overlap probe against the backend: distinct
    /// count of the source attribute, and how many of those values also
    /// appear in the target attribute.
    pub async fn test_joinability(&self, ctx: &Context, source: &AttributeRef, target: &AttributeRef) -> Result<JoinabilityResult> {
        let distinct_sql = format!("SELECT count(DISTINCT {}) as c FROM {}", source.attribute, source.event_type);
        let source_distinct = self.scalar_count(ctx, &distinct_sql).await?;

        let overlap_sql = format!(
            "SELECT count(DISTINCT {}) as c FROM {} WHERE {} IN (SELECT DISTINCT {} FROM {})",
            source.attribute, source.event_type, source.attribute, target.attribute, target.event_type,
        );
        let overlap_count = self.scalar_count(ctx, &overlap_sql).await?;

        let target_distinct_sql = format!("SELECT count(DISTINCT {}) as c FROM {}", target.attribute, target.event_type);
        let target_distinct = self.scalar_count(ctx, &target_distinct_sql).await?;

        let ratio = if source_distinct == 0 { 0.0 } else { overlap_count as f64 / source_distinct as f64 };
        Ok(JoinabilityResult {
            ratio,
            one_to_n: target_distinct > 0 && source_distinct > target_distinct,
            overlap: ratio,
        })
    }

    async fn scalar_count(&self, ctx: &Context, sql: &str) -> Result<u64> {
        let result = self.backend.query(ctx, sql).await?;
        Ok(result
            .rows
            .first()
            .and_then(|r| r.get("c"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0))
    }

    fn temporal_candidates(&self, source: &ProfiledSchema<'_>, target: &ProfiledSchema<'_>) -> Vec<Relationship> {
        let source_ts = find_timestamp_attr(source.schema);
        let target_ts = find_timestamp_attr(target.schema);
        let (Some(sattr), Some(tattr)) = (source_ts, target_ts) else {
            return Vec::new();
        };

        let completeness = (1.0 - sattr.null_ratio).min(1.0 - tattr.null_ratio);
        let overlap = source.sample.time_range.overlap_ratio(&target.sample.time_range);
        let confidence = completeness * overlap;
        if confidence <= 0.0 {
            return Vec::new();
        }

        let rel = Relationship::new(RelationshipType::Temporal, &source.schema.event_type, &target.schema.event_type)
            .with_attributes(sattr.name.clone(), tattr.name.clone())
            .with_evidence(Evidence {
                evidence_type: "time_range_overlap".into(),
                value: serde_json::json!(overlap),
                confidence,
                description: format!("{:.0}% time range overlap", overlap * 100.0),
            });
        vec![rel]
    }

    fn correlation_candidates(&self, source: &ProfiledSchema<'_>, target: &ProfiledSchema<'_>) -> Vec<Relationship> {
        let mut out = Vec::new();
        for sattr in numeric_attrs(source.schema) {
            for tattr in numeric_attrs(target.schema) {
                let xs = numeric_values(source.sample, &sattr.name);
                let ys = numeric_values(target.sample, &tattr.name);
                let n = xs.len().min(ys.len());
                if n < self.config.min_sample_size {
                    continue;
                }
                let r = pearson(&xs[..n], &ys[..n]);
                if r.abs() >= self.config.min_correlation {
                    let rel = Relationship::new(RelationshipType::Correlation, &source.schema.event_type, &target.schema.event_type)
                        .with_attributes(sattr.name.clone(), tattr.name.clone())
                        .with_evidence(Evidence {
                            evidence_type: "pearson".into(),
                            value: serde_json::json!(r),
                            confidence: r.abs(),
                            description: format!("Pearson r = {r:.3} over {n} aligned samples"),
                        });
                    out.push(rel);
                }
            }
        }
        out
    }

    fn hierarchy_candidate(&self, source: &ProfiledSchema<'_>, target: &ProfiledSchema<'_>) -> Option<Relationship> {
        let a = &source.schema.event_type;
        let b = &target.schema.event_type;
        if a != b && b.starts_with(a.as_str()) {
            let rel = Relationship::new(RelationshipType::Hierarchy, a, b).with_evidence(Evidence {
                evidence_type: "name_subsumption".into(),
                value: serde_json::json!(format!("{a} is a prefix of {b}")),
                confidence: 0.8,
                description: "schema name subsumption".into(),
            });
            return Some(rel);
        }
        None
    }

    /// Builds the relationship graph summary: nodes are distinct schemas
    /// appearing in any relationship, edges are the relationships
    /// themselves, hubs are schemas with degree >= 3.
    pub fn analyze_relationship_graph(&self, relationships: &[Relationship]) -> RelationshipGraph {
        let mut degree: HashMap<String, usize> = HashMap::new();
        let mut nodes: HashSet<String> = HashSet::new();
        for rel in relationships {
            nodes.insert(rel.source_schema.clone());
            nodes.insert(rel.target_schema.clone());
            *degree.entry(rel.source_schema.clone()).or_insert(0) += 1;
            *degree.entry(rel.target_schema.clone()).or_insert(0) += 1;
        }
        let mut node_list: Vec<String> = nodes.into_iter().collect();
        node_list.sort();

        let mut hubs: Vec<String> = degree
            .iter()
            .filter(|(_, &d)| d >= 3)
            .map(|(k, _)| k.clone())
            .collect();
        hubs.sort();

        let average_degree = if node_list.is_empty() {
            0.0
        } else {
            (2 * relationships.len()) as f64 / node_list.len() as f64
        };

        RelationshipGraph {
            nodes: node_list,
            edges: relationships.to_vec(),
            hubs,
            average_degree,
        }
    }
}

fn push_bounded(out: &mut Vec<Relationship>, counts: &mut HashMap<String, usize>, rel: Relationship, cap: usize) {
    let count = counts.entry(rel.source_schema.clone()).or_insert(0);
    if *count >= cap {
        return;
    }
    *count += 1;
    out.push(rel);
}

fn find_timestamp_attr(schema: &Schema) -> Option<&Attribute> {
    schema
        .attributes
        .iter()
        .find(|a| a.data_type == crate::models::DataType::Timestamp)
}

fn numeric_attrs(schema: &Schema) -> Vec<&Attribute> {
    schema.attributes.iter().filter(|a| a.data_type == crate::models::DataType::Numeric).collect()
}

fn numeric_values(sample: &DataSample, attribute: &str) -> Vec<f64> {
    sample.values_for(attribute).into_iter().filter_map(|v| v.as_f64()).collect()
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - x_mean) * (y - y_mean);
        var_x += (x - x_mean).powi(2);
        var_y += (y - y_mean).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::models::{Attribute, CardinalityInfo, DataType, Record, SemanticType, TimeRange};

    fn schema_with(event_type: &str, attrs: Vec<Attribute>) -> Schema {
        let mut schema = Schema::new(event_type);
        schema.attributes = attrs;
        schema
    }

    fn id_attr(name: &str) -> Attribute {
        let mut a = Attribute::new(name, DataType::String);
        a.semantic_type = Some(SemanticType::Id);
        a.cardinality = CardinalityInfo::new(90, 100);
        a
    }

    fn empty_sample(event_type: &str) -> DataSample {
        DataSample::new(event_type, Vec::<Record>::new(), 1.0, "uniform", TimeRange::last(chrono::Duration::hours(1)))
    }

    #[tokio::test]
    async fn join_detection_finds_shared_customer_id() {
        let mut orders_agg = Record::new();
        orders_agg.insert("c".into(), serde_json::json!(90));
        let mut customers_agg = Record::new();
        customers_agg.insert("c".into(), serde_json::json!(100));
        let backend = MockBackend::new()
            .with_event_type("Orders", vec![orders_agg])
            .with_event_type("Customers", vec![customers_agg]);
        let backend: Arc<dyn BackendClient> = Arc::new(backend);
        let miner = RelationshipMiner::new(backend, RelationshipMinerConfig::default());

        let orders = schema_with("Orders", vec![id_attr("orderId"), id_attr("customerId")]);
        let customers = schema_with("Customers", vec![id_attr("customerId")]);
        let orders_sample = empty_sample("Orders");
        let customers_sample = empty_sample("Customers");

        let schemas = vec![
            ProfiledSchema { schema: &orders, sample: &orders_sample },
            ProfiledSchema { schema: &customers, sample: &customers_sample },
        ];
        let ctx = Context::background();
        let rels = miner.find_relationships(&ctx, &schemas).await.unwrap();
        assert!(rels.iter().any(|r| r.relationship_type == RelationshipType::Join
            && r.join_keys.as_ref().map(|k| k.source_key == "customerId").unwrap_or(false)));
    }

    #[tokio::test]
    async fn no_common_fields_yields_no_join_relationships() {
        let backend = MockBackend::new()
            .with_event_type("Products", vec![])
            .with_event_type("Logs", vec![]);
        let backend: Arc<dyn BackendClient> = Arc::new(backend);
        let miner = RelationshipMiner::new(backend, RelationshipMinerConfig::default());

        let products = schema_with("Products", vec![Attribute::new("productId", DataType::String), Attribute::new("name", DataType::String)]);
        let logs = schema_with("Logs", vec![Attribute::new("message", DataType::String), Attribute::new("level", DataType::String)]);
        let products_sample = empty_sample("Products");
        let logs_sample = empty_sample("Logs");

        let schemas = vec![
            ProfiledSchema { schema: &products, sample: &products_sample },
            ProfiledSchema { schema: &logs, sample: &logs_sample },
        ];
        let ctx = Context::background();
        let rels = miner.find_relationships(&ctx, &schemas).await.unwrap();
        assert!(rels.iter().all(|r| r.relationship_type != RelationshipType::Join));
    }

    #[test]
    fn graph_analysis_identifies_hubs() {
        let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::new());
        let miner = RelationshipMiner::new(backend, RelationshipMinerConfig::default());
        let rels = vec![
            Relationship::new(RelationshipType::Join, "Orders", "Customers"),
            Relationship::new(RelationshipType::Join, "Orders", "Products"),
            Relationship::new(RelationshipType::Join, "Orders", "Shipping"),
            Relationship::new(RelationshipType::Join, "Customers", "Events"),
        ];
        let graph = miner.analyze_relationship_graph(&rels);
        assert_eq!(graph.nodes.len(), 5);
        assert_eq!(graph.edges.len(), 4);
        assert!(graph.average_degree > 0.0);
        assert!(graph.hubs.contains(&"Orders".to_string()));
    }
}
