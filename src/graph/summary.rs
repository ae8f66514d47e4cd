//! Graph summaries for project-wide consumers
//!
//! [`GraphSummary`] is the serialized shape a dependency-graph viewer reads.
//! [`resolve_relationship_edges`] turns relationships into entity-to-entity
//! edges for diagrams, reporting the ones it cannot place.

use serde::{Deserialize, Serialize};

use super::{FieldLookup, ModelName, ResolvedGraph};
use crate::model::{Cardinality, FieldRef};

/// Summary of one resolution, root model first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub root_model: ModelName,
    pub model_count: usize,
    /// Sum of the per-model entity counts
    pub total_entities: usize,
    pub models: Vec<ModelSummary>,
    pub cross_model_relationships: Vec<CrossModelRelationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: ModelName,
    /// File name of the source document, empty for in-memory documents
    pub file: String,
    /// Full path of the source document, empty for in-memory documents
    pub path: String,
    pub entities: Vec<String>,
    pub entity_count: usize,
    pub imports: Vec<ModelName>,
}

/// Relationship whose endpoints belong to entities from different models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossModelRelationship {
    pub from_model: ModelName,
    pub to_model: ModelName,
    pub from_entity: String,
    pub to_entity: String,
}

impl GraphSummary {
    pub fn from_graph(graph: &ResolvedGraph) -> Self {
        let models: Vec<ModelSummary> = graph
            .models()
            .iter()
            .map(|info| {
                let (file, path) = match &info.origin {
                    Some(origin) => (
                        origin
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        origin.display().to_string(),
                    ),
                    None => (String::new(), String::new()),
                };
                ModelSummary {
                    name: info.name.clone(),
                    file,
                    path,
                    entities: info.entities.clone(),
                    entity_count: info.entities.len(),
                    imports: info.imports.clone(),
                }
            })
            .collect();

        // keyed on the entity part only; the field need not exist
        let endpoint = |reference: &str| {
            FieldRef::parse(reference).and_then(|r| graph.lookup_entity(&r.entity).entity())
        };
        let cross_model_relationships = graph
            .relationships()
            .iter()
            .filter_map(|resolved| {
                let from = endpoint(&resolved.relationship.from)?;
                let to = endpoint(&resolved.relationship.to)?;
                (from.model != to.model).then(|| CrossModelRelationship {
                    from_model: from.model.clone(),
                    to_model: to.model.clone(),
                    from_entity: from.name().to_string(),
                    to_entity: to.name().to_string(),
                })
            })
            .collect();

        Self {
            root_model: graph.root_name().to_string(),
            model_count: models.len(),
            total_entities: models.iter().map(|m| m.entity_count).sum(),
            models,
            cross_model_relationships,
        }
    }
}

impl ResolvedGraph {
    pub fn summary(&self) -> GraphSummary {
        GraphSummary::from_graph(self)
    }
}

// =============================================================================
// Relationship Edges
// =============================================================================

/// Relationship placed between two resolved entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEdge {
    pub relationship: String,
    pub from_entity: String,
    pub from_field: String,
    pub from_model: ModelName,
    pub to_entity: String,
    pub to_field: String,
    pub to_model: ModelName,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeReport {
    pub edges: Vec<ResolvedEdge>,
    /// One message per relationship that could not be placed, in declaration order
    pub warnings: Vec<String>,
}

/// Place every relationship of the graph between its two entities.
///
/// A relationship with a malformed endpoint or an unknown entity is reported
/// as having invalid field references; one whose entities exist but whose
/// fields do not is reported as referencing missing fields.
pub fn resolve_relationship_edges(graph: &ResolvedGraph) -> EdgeReport {
    let mut report = EdgeReport::default();

    for resolved in graph.relationships() {
        let rel = &resolved.relationship;
        let from = graph.lookup_field(&rel.from);
        let to = graph.lookup_field(&rel.to);

        match (&from, &to) {
            (
                FieldLookup::Found { entity: fe, field: ff },
                FieldLookup::Found { entity: te, field: tf },
            ) => report.edges.push(ResolvedEdge {
                relationship: rel.name.clone(),
                from_entity: fe.name().to_string(),
                from_field: ff.name.clone(),
                from_model: fe.model.clone(),
                to_entity: te.name().to_string(),
                to_field: tf.name.clone(),
                to_model: te.model.clone(),
                cardinality: rel.cardinality,
            }),
            _ if is_invalid(&from) || is_invalid(&to) => report.warnings.push(format!(
                "Relationship '{}' has invalid field references: '{}' -> '{}'",
                rel.name, rel.from, rel.to
            )),
            _ => {
                let missing: Vec<&str> = [(&from, rel.from.as_str()), (&to, rel.to.as_str())]
                    .into_iter()
                    .filter(|(lookup, _)| matches!(lookup, FieldLookup::MissingField { .. }))
                    .map(|(_, reference)| reference)
                    .collect();
                report.warnings.push(format!(
                    "Relationship '{}' references missing fields: {}",
                    rel.name,
                    missing.join(", ")
                ));
            }
        }
    }

    if !report.warnings.is_empty() {
        tracing::debug!(
            placed = report.edges.len(),
            skipped = report.warnings.len(),
            "relationship edges resolved with warnings"
        );
    }
    report
}

fn is_invalid(lookup: &FieldLookup<'_>) -> bool {
    matches!(lookup, FieldLookup::Malformed | FieldLookup::UnknownEntity { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ModelDocument;
    use crate::graph::{resolve, resolve_standalone};
    use crate::loader::MemoryLoader;
    use serde_json::json;

    fn doc(name: &str, imports: serde_json::Value, rest: serde_json::Value) -> ModelDocument {
        let mut content = json!({
            "model": {
                "name": name,
                "version": "1.0.0",
                "domain": "commerce",
                "owners": ["data@example.com"],
                "state": "draft",
                "imports": imports
            }
        });
        if let (Some(target), Some(extra)) = (content.as_object_mut(), rest.as_object()) {
            target.extend(extra.clone());
        }
        ModelDocument::new(content)
    }

    #[test]
    fn test_missing_fields_and_invalid_references_are_distinguished() {
        let model = doc(
            "shop",
            json!([]),
            json!({
                "entities": [
                    { "name": "Orders", "type": "table", "description": "d", "fields": [
                        { "name": "id", "type": "integer", "primary_key": true },
                        { "name": "customer_id", "type": "integer" }
                    ]},
                    { "name": "Customers", "type": "table", "description": "d", "fields": [
                        { "name": "id", "type": "integer", "primary_key": true }
                    ]}
                ],
                "relationships": [
                    { "name": "orders_customer", "from": "Orders.customer_id", "to": "Customers.customer_id", "cardinality": "many_to_one" },
                    { "name": "broken", "from": "Orders", "to": "Customers.customer_id", "cardinality": "many_to_one" }
                ]
            }),
        );

        let graph = resolve_standalone(&model).unwrap();
        let report = resolve_relationship_edges(&graph);

        assert_eq!(report.edges.len(), 0);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].to_lowercase().contains("missing fields"));
        assert!(report.warnings[1].to_lowercase().contains("invalid field references"));
    }

    #[test]
    fn test_cross_model_relationship_in_summary() {
        let a = doc(
            "A",
            json!([]),
            json!({ "entities": [
                { "name": "Orders", "type": "table", "description": "d", "fields": [
                    { "name": "id", "type": "integer", "primary_key": true },
                    { "name": "customer_id", "type": "integer" }
                ]}
            ]}),
        );
        let b = doc(
            "B",
            json!([{ "model": "A" }]),
            json!({
                "entities": [
                    { "name": "Customers", "type": "table", "description": "d", "fields": [
                        { "name": "id", "type": "integer", "primary_key": true }
                    ]}
                ],
                "relationships": [
                    { "name": "customer_orders", "from": "Customers.id", "to": "Orders.customer_id", "cardinality": "one_to_many" }
                ]
            }),
        );
        let loader = MemoryLoader::new().with("A", a);

        let summary = resolve(&b, &loader).unwrap().summary();

        assert_eq!(summary.root_model, "B");
        assert_eq!(summary.model_count, 2);
        assert_eq!(summary.total_entities, 2);
        assert_eq!(summary.models[0].name, "B");
        assert_eq!(summary.models[0].imports, vec!["A"]);
        assert_eq!(summary.models[0].file, "");
        assert_eq!(
            summary.cross_model_relationships,
            vec![CrossModelRelationship {
                from_model: "B".into(),
                to_model: "A".into(),
                from_entity: "Customers".into(),
                to_entity: "Orders".into(),
            }]
        );
    }

    #[test]
    fn test_cross_model_entry_does_not_need_the_field() {
        let a = doc(
            "A",
            json!([]),
            json!({ "entities": [
                { "name": "Orders", "type": "table", "description": "d", "fields": [
                    { "name": "id", "type": "integer", "primary_key": true }
                ]}
            ]}),
        );
        let b = doc(
            "B",
            json!([{ "model": "A" }]),
            json!({
                "entities": [
                    { "name": "Customers", "type": "table", "description": "d", "fields": [
                        { "name": "id", "type": "integer", "primary_key": true }
                    ]}
                ],
                "relationships": [
                    { "name": "customer_orders", "from": "Customers.id", "to": "Orders.customer_id", "cardinality": "one_to_many" },
                    { "name": "dangling", "from": "Customers.id", "to": "Nowhere.id", "cardinality": "one_to_many" }
                ]
            }),
        );
        let graph = resolve(&b, &MemoryLoader::new().with("A", a)).unwrap();

        assert!(resolve_relationship_edges(&graph).edges.is_empty());
        let cross: Vec<_> = graph
            .summary()
            .cross_model_relationships
            .into_iter()
            .map(|r| (r.from_model, r.to_model, r.to_entity))
            .collect();
        assert_eq!(cross, vec![("B".to_string(), "A".to_string(), "Orders".to_string())]);
    }

    #[test]
    fn test_summary_serializes_contract_keys() {
        let model = doc("solo", json!([]), json!({}));
        let value = serde_json::to_value(resolve_standalone(&model).unwrap().summary()).unwrap();

        for key in ["model_count", "total_entities", "models", "cross_model_relationships"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        let first = &value["models"][0];
        for key in ["name", "file", "path", "entities", "entity_count", "imports"] {
            assert!(first.get(key).is_some(), "missing models[].{}", key);
        }
    }
}
