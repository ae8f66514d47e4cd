//! Semantic Validation
//!
//! Cross-referential rules over a whole resolved graph. Every rule runs and
//! every finding is collected; nothing short-circuits.
//!
//! ## Rules
//! 1. **Unique names**: entities, relationships, indexes, glossary terms (error)
//! 2. **Unique fields** within each entity (error)
//! 3. **Primary keys**: every `table` declares one; other kinds are exempt (error)
//! 4. **Relationship integrity**: endpoints parse and resolve (error)
//! 5. **Index validity**: entity and every listed field exist (error)
//! 6. **Glossary links**: `related_fields` resolve (warning)
//! 7. **Field consistency**: deprecated/computed flags carry their companions (warning)
//! 8. **Governance orphans**: classification keys name existing fields (warning)
//! 9. **Rule targets**: each rule names an existing entity or field (warning)
//!
//! Paths point into the resolved graph, in its merge order:
//! `/entities/3/fields/1`, `/relationships/0/to`, `/governance/classification/Orders.email`.

use std::collections::HashMap;

use crate::graph::{EntityLookup, FieldLookup, ResolvedGraph};
use crate::issue::{escape_segment, IssueCode, Issues};
use crate::model::FieldRef;

/// The semantic validator
#[derive(Debug, Clone)]
pub struct SemanticValidator {
    /// How many close entity names to offer for an unknown one
    suggestions: usize,
}

impl Default for SemanticValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticValidator {
    pub fn new() -> Self {
        Self { suggestions: 1 }
    }

    pub fn with_suggestions(mut self, suggestions: usize) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Run every rule against the graph
    pub fn validate(&self, graph: &ResolvedGraph) -> Issues {
        let mut issues = Issues::new();

        self.check_unique_names(graph, &mut issues);
        self.check_entities(graph, &mut issues);
        self.check_relationships(graph, &mut issues);
        self.check_indexes(graph, &mut issues);
        self.check_glossary_links(graph, &mut issues);
        self.check_governance(graph, &mut issues);
        self.check_rule_targets(graph, &mut issues);

        tracing::debug!(
            root = %graph.root_name(),
            errors = issues.error_count(),
            warnings = issues.warning_count(),
            "semantic validation finished"
        );
        issues
    }

    fn check_unique_names(&self, graph: &ResolvedGraph, issues: &mut Issues) {
        report_duplicates(
            "entity",
            "/entities",
            graph.entities().iter().map(|e| (e.name(), e.model.as_str())),
            issues,
        );
        report_duplicates(
            "relationship",
            "/relationships",
            graph
                .relationships()
                .iter()
                .map(|r| (r.relationship.name.as_str(), r.model.as_str())),
            issues,
        );
        report_duplicates(
            "index",
            "/indexes",
            graph
                .indexes()
                .iter()
                .map(|i| (i.index.name.as_str(), i.model.as_str())),
            issues,
        );
        report_duplicates(
            "glossary term",
            "/glossary",
            graph
                .glossary()
                .iter()
                .map(|t| (t.term.term.as_str(), t.model.as_str())),
            issues,
        );
    }

    fn check_entities(&self, graph: &ResolvedGraph, issues: &mut Issues) {
        for (i, resolved) in graph.entities().iter().enumerate() {
            let entity = &resolved.entity;
            let base = format!("/entities/{}", i);

            let mut seen: HashMap<&str, usize> = HashMap::new();
            for (j, field) in entity.fields.iter().enumerate() {
                let first = *seen.entry(field.name.as_str()).or_insert(j);
                if first != j {
                    issues.report(
                        IssueCode::DuplicateField,
                        format!("{}/fields/{}", base, j),
                        format!(
                            "field '{}' is declared more than once in entity '{}' (first at position {})",
                            field.name, entity.name, first
                        ),
                    );
                }
            }

            if entity.kind.requires_primary_key() && !entity.has_primary_key() {
                issues.report(
                    IssueCode::MissingPrimaryKey,
                    base.clone(),
                    format!("table '{}' declares no primary key field", entity.name),
                );
            }

            for (j, field) in entity.fields.iter().enumerate() {
                let path = format!("{}/fields/{}", base, j);

                if field.is_deprecated() && is_blank(field.deprecated_message.as_deref()) {
                    issues.report(
                        IssueCode::DeprecatedWithoutMessage,
                        path.clone(),
                        format!(
                            "deprecated field '{}.{}' has no deprecated_message",
                            entity.name, field.name
                        ),
                    );
                }

                if field.is_computed() && field.is_primary_key() {
                    issues.report(
                        IssueCode::ComputedPrimaryKey,
                        path.clone(),
                        format!(
                            "field '{}.{}' is both computed and a primary key",
                            entity.name, field.name
                        ),
                    );
                }

                if field.is_computed() && is_blank(field.computed_expression.as_deref()) {
                    issues.report(
                        IssueCode::ComputedWithoutExpression,
                        path,
                        format!(
                            "computed field '{}.{}' has no computed_expression",
                            entity.name, field.name
                        ),
                    );
                }
            }
        }
    }

    fn check_relationships(&self, graph: &ResolvedGraph, issues: &mut Issues) {
        for (i, resolved) in graph.relationships().iter().enumerate() {
            let rel = &resolved.relationship;

            for (end, reference) in [("from", &rel.from), ("to", &rel.to)] {
                let path = format!("/relationships/{}/{}", i, end);
                match graph.lookup_field(reference) {
                    FieldLookup::Found { .. } => {}
                    FieldLookup::MissingField { entity } => issues.report(
                        IssueCode::MissingFields,
                        path,
                        format!(
                            "Relationship '{}' references missing fields: entity '{}' has no field '{}'",
                            rel.name,
                            entity.name(),
                            FieldRef::parse(reference).map(|r| r.field).unwrap_or_default()
                        ),
                    ),
                    FieldLookup::Malformed => issues.report(
                        IssueCode::InvalidFieldReference,
                        path,
                        format!(
                            "Relationship '{}' has invalid field references: '{}' is not of the form Entity.Field",
                            rel.name, reference
                        ),
                    ),
                    FieldLookup::UnknownEntity { entity } => issues.report(
                        IssueCode::InvalidFieldReference,
                        path,
                        format!(
                            "Relationship '{}' has invalid field references: {}",
                            rel.name,
                            self.describe_unknown(graph, &entity)
                        ),
                    ),
                }
            }
        }
    }

    fn check_indexes(&self, graph: &ResolvedGraph, issues: &mut Issues) {
        for (i, resolved) in graph.indexes().iter().enumerate() {
            let index = &resolved.index;
            let base = format!("/indexes/{}", i);

            let Some(entity) = graph.lookup_entity(&index.entity).entity() else {
                issues.report(
                    IssueCode::InvalidIndex,
                    format!("{}/entity", base),
                    format!(
                        "index '{}' is on {}",
                        index.name,
                        self.describe_unknown(graph, &index.entity)
                    ),
                );
                continue;
            };

            for (j, field) in index.fields.iter().enumerate() {
                if entity.entity.field(field).is_none() {
                    issues.report(
                        IssueCode::InvalidIndex,
                        format!("{}/fields/{}", base, j),
                        format!(
                            "index '{}' lists field '{}' which entity '{}' does not have",
                            index.name,
                            field,
                            entity.name()
                        ),
                    );
                }
            }
        }
    }

    fn check_glossary_links(&self, graph: &ResolvedGraph, issues: &mut Issues) {
        for (i, resolved) in graph.glossary().iter().enumerate() {
            let term = &resolved.term;
            for (j, link) in term.related_fields.iter().enumerate() {
                if !matches!(graph.lookup_field(link), FieldLookup::Found { .. }) {
                    issues.report(
                        IssueCode::DanglingGlossaryLink,
                        format!("/glossary/{}/related_fields/{}", i, j),
                        format!(
                            "glossary term '{}' links to '{}' which does not resolve to a field",
                            term.term, link
                        ),
                    );
                }
            }
        }
    }

    fn check_governance(&self, graph: &ResolvedGraph, issues: &mut Issues) {
        for key in graph.governance().classification.keys() {
            if !matches!(graph.lookup_field(key), FieldLookup::Found { .. }) {
                issues.report(
                    IssueCode::GovernanceOrphan,
                    format!("/governance/classification/{}", escape_segment(key)),
                    format!("classification for '{}' does not match any existing field", key),
                );
            }
        }
    }

    fn check_rule_targets(&self, graph: &ResolvedGraph, issues: &mut Issues) {
        for (i, resolved) in graph.rules().iter().enumerate() {
            let target = resolved.rule.target.trim();
            let found = graph.lookup_entity(target).entity().is_some()
                || matches!(graph.lookup_field(target), FieldLookup::Found { .. });
            if !found {
                issues.report(
                    IssueCode::DanglingRuleTarget,
                    format!("/rules/{}/target", i),
                    format!(
                        "rule '{}' targets '{}' which is neither an entity nor a field",
                        resolved.rule.name, target
                    ),
                );
            }
        }
    }

    fn describe_unknown(&self, graph: &ResolvedGraph, entity: &str) -> String {
        if matches!(graph.lookup_entity(entity), EntityLookup::Ambiguous) {
            return format!(
                "entity name '{}' is ambiguous; qualify it with an import alias",
                entity
            );
        }

        let suggestions = graph.suggest_entities(entity, self.suggestions);
        match suggestions.as_slice() {
            [] => format!("entity '{}' does not exist", entity),
            names => format!(
                "entity '{}' does not exist (did you mean '{}'?)",
                entity,
                names.join("', '")
            ),
        }
    }
}

/// Validate a resolved graph with the default rule settings
pub fn lint_graph(graph: &ResolvedGraph) -> Issues {
    SemanticValidator::new().validate(graph)
}

fn report_duplicates<'a>(
    kind: &str,
    base: &str,
    names: impl Iterator<Item = (&'a str, &'a str)>,
    issues: &mut Issues,
) {
    let mut first_seen: HashMap<&str, &str> = HashMap::new();
    for (i, (name, model)) in names.enumerate() {
        match first_seen.get(name) {
            Some(first_model) => issues.report(
                IssueCode::DuplicateName,
                format!("{}/{}", base, i),
                format!(
                    "duplicate {} name '{}' (declared by '{}' and '{}')",
                    kind, name, first_model, model
                ),
            ),
            None => {
                first_seen.insert(name, model);
            }
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ModelDocument;
    use crate::graph::resolve_standalone;
    use serde_json::{json, Value};

    fn graph(body: Value) -> ResolvedGraph {
        let mut content = json!({
            "model": {
                "name": "shop",
                "version": "1.0.0",
                "domain": "commerce",
                "owners": ["data@example.com"],
                "state": "draft"
            }
        });
        if let (Some(target), Some(extra)) = (content.as_object_mut(), body.as_object()) {
            target.extend(extra.clone());
        }
        resolve_standalone(&ModelDocument::new(content)).unwrap()
    }

    fn orders_and_customers() -> Value {
        json!([
            { "name": "Orders", "type": "table", "description": "d", "fields": [
                { "name": "id", "type": "integer", "primary_key": true },
                { "name": "customer_id", "type": "integer" }
            ]},
            { "name": "Customers", "type": "table", "description": "d", "fields": [
                { "name": "id", "type": "integer", "primary_key": true }
            ]}
        ])
    }

    #[test]
    fn test_clean_model() {
        let g = graph(json!({
            "entities": orders_and_customers(),
            "relationships": [
                { "name": "orders_customer", "from": "Orders.customer_id", "to": "Customers.id", "cardinality": "many_to_one" }
            ],
            "indexes": [{ "name": "idx_orders_customer", "entity": "Orders", "fields": ["customer_id"] }],
            "governance": { "classification": { "Orders.customer_id": "internal" } }
        }));
        assert!(lint_graph(&g).is_empty());
    }

    #[test]
    fn test_primary_key_rule_exempts_views() {
        let g = graph(json!({ "entities": [
            { "name": "ActiveCustomers", "type": "view", "description": "d", "fields": [
                { "name": "id", "type": "integer" }
            ]},
            { "name": "Customers", "type": "table", "description": "d", "fields": [
                { "name": "id", "type": "integer" }
            ]}
        ]}));

        let issues = lint_graph(&g);
        let pk: Vec<_> = issues.with_code(IssueCode::MissingPrimaryKey).collect();
        assert_eq!(pk.len(), 1);
        assert_eq!(pk[0].path, "/entities/1");
        assert!(pk[0].message.contains("Customers"));
    }

    #[test]
    fn test_missing_field_and_malformed_reference_are_distinguished() {
        let g = graph(json!({
            "entities": orders_and_customers(),
            "relationships": [
                { "name": "orders_customer", "from": "Orders.customer_id", "to": "Customers.customer_id", "cardinality": "many_to_one" },
                { "name": "broken", "from": "Orders", "to": "Customers.id", "cardinality": "many_to_one" }
            ]
        }));

        let issues = lint_graph(&g);
        let errors: Vec<_> = issues.errors().collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].code, IssueCode::MissingFields);
        assert_eq!(errors[0].path, "/relationships/0/to");
        assert!(errors[0].message.contains("missing fields"));
        assert_eq!(errors[1].code, IssueCode::InvalidFieldReference);
        assert_eq!(errors[1].path, "/relationships/1/from");
        assert!(errors[1].message.contains("invalid field references"));
    }

    #[test]
    fn test_unknown_entity_offers_suggestion() {
        let g = graph(json!({
            "entities": orders_and_customers(),
            "relationships": [
                { "name": "typo", "from": "Orders.customer_id", "to": "Customer.id", "cardinality": "many_to_one" }
            ]
        }));

        let issues = lint_graph(&g);
        let invalid: Vec<_> = issues.with_code(IssueCode::InvalidFieldReference).collect();
        assert_eq!(invalid.len(), 1);
        assert!(invalid[0].message.contains("did you mean 'Customers'"));
    }

    #[test]
    fn test_duplicates_are_all_reported() {
        let g = graph(json!({
            "entities": [
                { "name": "Orders", "type": "table", "description": "d", "fields": [
                    { "name": "id", "type": "integer", "primary_key": true },
                    { "name": "id", "type": "bigint" }
                ]},
                { "name": "Orders", "type": "table", "description": "d", "fields": [
                    { "name": "id", "type": "integer", "primary_key": true }
                ]}
            ],
            "glossary": [
                { "term": "Order", "definition": "a purchase" },
                { "term": "Order", "definition": "a sequence" }
            ]
        }));

        let issues = lint_graph(&g);
        assert_eq!(issues.with_code(IssueCode::DuplicateName).count(), 2);
        assert_eq!(issues.with_code(IssueCode::DuplicateField).count(), 1);
    }

    #[test]
    fn test_index_validity() {
        let g = graph(json!({
            "entities": orders_and_customers(),
            "indexes": [
                { "name": "idx_bad_field", "entity": "Orders", "fields": ["id", "placed_at"] },
                { "name": "idx_bad_entity", "entity": "Invoices", "fields": ["id"] }
            ]
        }));

        let issues = lint_graph(&g);
        let paths: Vec<_> = issues
            .with_code(IssueCode::InvalidIndex)
            .map(|i| i.path.as_str())
            .collect();
        assert_eq!(paths, vec!["/indexes/0/fields/1", "/indexes/1/entity"]);
    }

    #[test]
    fn test_field_consistency_warnings() {
        let g = graph(json!({ "entities": [
            { "name": "Orders", "type": "table", "description": "d", "fields": [
                { "name": "id", "type": "integer", "primary_key": true, "computed": true, "computed_expression": "seq()" },
                { "name": "total", "type": "decimal(10,2)", "computed": true },
                { "name": "legacy_code", "type": "string", "deprecated": true, "deprecated_message": "  " }
            ]}
        ]}));

        let issues = lint_graph(&g);
        assert!(!issues.has_errors());
        assert_eq!(issues.with_code(IssueCode::ComputedPrimaryKey).count(), 1);
        assert_eq!(issues.with_code(IssueCode::ComputedWithoutExpression).count(), 1);
        assert_eq!(issues.with_code(IssueCode::DeprecatedWithoutMessage).count(), 1);
    }

    #[test]
    fn test_orphans_and_dangling_links_are_warnings() {
        let g = graph(json!({
            "entities": orders_and_customers(),
            "glossary": [
                { "term": "Customer", "definition": "a buyer", "related_fields": ["Customers.id", "Customers.email"] }
            ],
            "governance": { "classification": { "Customers.email": "pii", "Orders.id": "internal" } }
        }));

        let issues = lint_graph(&g);
        assert!(!issues.has_errors());
        let orphans: Vec<_> = issues.with_code(IssueCode::GovernanceOrphan).collect();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].path, "/governance/classification/Customers.email");
        assert_eq!(issues.with_code(IssueCode::DanglingGlossaryLink).count(), 1);
    }

    #[test]
    fn test_rule_targets_resolve_to_entity_or_field() {
        let g = graph(json!({
            "entities": orders_and_customers(),
            "rules": [
                { "name": "positive_total", "target": "Orders.id", "expression": "id > 0" },
                { "name": "has_orders", "target": "Customers" },
                { "name": "stale", "target": "Orders.total" }
            ]
        }));

        let issues = lint_graph(&g);
        assert!(!issues.has_errors());
        let dangling: Vec<_> = issues.with_code(IssueCode::DanglingRuleTarget).collect();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].path, "/rules/2/target");
    }

    #[test]
    fn test_aliased_import_keeps_its_own_references() {
        use crate::graph::resolve;
        use crate::loader::MemoryLoader;

        let shared = ModelDocument::new(json!({
            "model": {
                "name": "shared", "version": "1.0.0", "domain": "commerce",
                "owners": ["data@example.com"], "state": "draft"
            },
            "entities": [
                { "name": "Customer", "type": "table", "description": "d", "fields": [
                    { "name": "id", "type": "integer", "primary_key": true }
                ]},
                { "name": "Order", "type": "table", "description": "d", "fields": [
                    { "name": "id", "type": "integer", "primary_key": true },
                    { "name": "customer_id", "type": "integer" }
                ]}
            ],
            "relationships": [
                { "name": "order_customer", "from": "Order.customer_id", "to": "Customer.id", "cardinality": "many_to_one" }
            ]
        }));
        let app = ModelDocument::new(json!({
            "model": {
                "name": "app", "version": "1.0.0", "domain": "commerce",
                "owners": ["data@example.com"], "state": "draft",
                "imports": [{ "model": "shared", "alias": "sh" }]
            },
            "entities": [
                { "name": "Customer", "type": "table", "description": "d", "fields": [
                    { "name": "code", "type": "string", "primary_key": true }
                ]}
            ]
        }));

        let g = resolve(&app, &MemoryLoader::new().with("shared", shared)).unwrap();
        let issues = lint_graph(&g);
        assert!(!issues.has_errors(), "{}", issues.format_all());

        let model = crate::canonical::compile(&g);
        let rel = &model.relationships[0];
        assert_eq!(rel.from, "sh.Order.customer_id");
        assert_eq!(rel.to, "sh.Customer.id");
    }
}
