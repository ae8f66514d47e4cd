//! Canonical Compiler
//!
//! Reduces a resolved graph to one deterministic value. Two graphs that differ
//! only in authoring order, spelling of types, or which optional attributes
//! were written out compile to equal models with equal checksums.
//!
//! ## Ordering
//! - entities by name
//! - fields: primary keys first in declared order, then the rest by name
//! - relationships by name, then endpoints, then cardinality
//! - indexes by name, then entity
//! - glossary terms by term
//! - rules by name, then target
//! - tags, owners, imports, related fields: sorted
//!
//! All comparisons are ordinal and case-sensitive.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::checksum::Checksum;
use crate::error::{ModelError, Result};
use crate::graph::ResolvedGraph;
use crate::issue::Issues;
use crate::model::{Cardinality, EntityKind, Field, FieldType, Governance, LifecycleState};

/// Deterministic, fully normalized model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalModel {
    pub model: CanonicalMeta,
    pub entities: Vec<CanonicalEntity>,
    pub relationships: Vec<CanonicalRelationship>,
    pub indexes: Vec<CanonicalIndex>,
    pub glossary: Vec<CanonicalTerm>,
    pub governance: Governance,
    #[serde(default)]
    pub rules: Vec<CanonicalRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMeta {
    pub name: String,
    pub version: String,
    pub domain: String,
    pub owners: Vec<String>,
    pub state: LifecycleState,
    /// Names of directly imported models
    pub imports: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub fields: Vec<CanonicalField>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub schema: Option<String>,
    pub database: Option<String>,
    pub subject_area: Option<String>,
    pub owner: Option<String>,
    pub sla: Option<serde_json::Value>,
}

impl CanonicalEntity {
    pub fn field(&self, name: &str) -> Option<&CanonicalField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Field with every flag explicit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub foreign_key: bool,
    pub computed: bool,
    pub computed_expression: Option<String>,
    pub deprecated: bool,
    pub deprecated_message: Option<String>,
    pub sensitivity: Option<String>,
    pub description: Option<String>,
}

impl From<&Field> for CanonicalField {
    fn from(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            field_type: field.field_type.clone(),
            nullable: field.is_nullable(),
            primary_key: field.is_primary_key(),
            unique: field.is_unique(),
            foreign_key: field.is_foreign_key(),
            computed: field.is_computed(),
            computed_expression: non_blank(field.computed_expression.as_deref()),
            deprecated: field.is_deprecated(),
            deprecated_message: non_blank(field.deprecated_message.as_deref()),
            sensitivity: non_blank(field.sensitivity.as_deref()),
            description: non_blank(field.description.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRelationship {
    pub name: String,
    pub from: String,
    pub to: String,
    pub cardinality: Cardinality,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalIndex {
    pub name: String,
    pub entity: String,
    /// Column order is significant and kept as declared
    pub fields: Vec<String>,
    pub unique: bool,
    #[serde(rename = "type")]
    pub index_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTerm {
    pub term: String,
    pub definition: String,
    pub related_fields: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRule {
    pub name: String,
    pub target: String,
    pub expression: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
}

// =============================================================================
// Compilation
// =============================================================================

/// Compile a resolved graph.
///
/// Does not re-validate; run the semantic validator first and only compile
/// graphs without errors (see [`compile_checked`]).
pub fn compile(graph: &ResolvedGraph) -> CanonicalModel {
    let meta = graph.meta();
    let mut imports: Vec<String> = graph
        .imports_of(graph.root_name())
        .into_iter()
        .cloned()
        .collect();
    imports.sort();
    imports.dedup();

    let model = CanonicalMeta {
        name: meta.name.clone(),
        version: meta.version.trim().to_string(),
        domain: meta.domain.clone(),
        owners: sorted(meta.owners.iter().cloned()),
        state: meta.state,
        imports,
        description: non_blank(meta.description.as_deref()),
    };

    let entities = graph
        .entities()
        .iter()
        .map(|resolved| {
            let entity = &resolved.entity;
            CanonicalEntity {
                name: entity.name.clone(),
                kind: entity.kind,
                fields: entity.fields.iter().map(CanonicalField::from).collect(),
                tags: sorted(entity.tags.iter().cloned()),
                description: non_blank(entity.description.as_deref()),
                schema: non_blank(entity.schema.as_deref()),
                database: non_blank(entity.database.as_deref()),
                subject_area: non_blank(entity.subject_area.as_deref()),
                owner: non_blank(entity.owner.as_deref()),
                sla: entity.sla.clone().filter(|v| !v.is_null()),
            }
        })
        .collect();

    let relationships = graph
        .relationships()
        .iter()
        .map(|resolved| {
            let rel = &resolved.relationship;
            CanonicalRelationship {
                name: rel.name.clone(),
                from: graph.normalize_reference(&rel.from),
                to: graph.normalize_reference(&rel.to),
                cardinality: rel.cardinality,
                description: non_blank(rel.description.as_deref()),
            }
        })
        .collect();

    let indexes = graph
        .indexes()
        .iter()
        .map(|resolved| {
            let index = &resolved.index;
            let entity = graph
                .entity(&index.entity)
                .map(|e| e.name().to_string())
                .unwrap_or_else(|| index.entity.clone());
            CanonicalIndex {
                name: index.name.clone(),
                entity,
                fields: index.fields.clone(),
                unique: index.unique.unwrap_or(false),
                index_type: non_blank(index.index_type.as_deref()),
            }
        })
        .collect();

    let glossary = graph
        .glossary()
        .iter()
        .map(|resolved| {
            let term = &resolved.term;
            CanonicalTerm {
                term: term.term.clone(),
                definition: term.definition.clone(),
                related_fields: sorted(
                    term.related_fields
                        .iter()
                        .map(|r| graph.normalize_reference(r)),
                ),
                tags: sorted(term.tags.iter().cloned()),
            }
        })
        .collect();

    let source = graph.governance();
    let governance = Governance {
        classification: source
            .classification
            .iter()
            .map(|(key, label)| (graph.normalize_reference(key), label.clone()))
            .collect::<BTreeMap<_, _>>(),
        stewards: source.stewards.clone(),
    };

    let rules = graph
        .rules()
        .iter()
        .map(|resolved| {
            let rule = &resolved.rule;
            let target = match graph.entity(rule.target.trim()) {
                Some(entity) => entity.name().to_string(),
                None => graph.normalize_reference(&rule.target),
            };
            CanonicalRule {
                name: rule.name.clone(),
                target,
                expression: non_blank(rule.expression.as_deref()),
                severity: non_blank(rule.severity.as_deref()),
                description: non_blank(rule.description.as_deref()),
            }
        })
        .collect();

    let mut canonical = CanonicalModel {
        model,
        entities,
        relationships,
        indexes,
        glossary,
        governance,
        rules,
    };
    canonical.normalize();

    tracing::info!(
        model = %canonical.model.name,
        entities = canonical.entities.len(),
        relationships = canonical.relationships.len(),
        "compiled canonical model"
    );
    canonical
}

/// Compile only if `issues` holds no errors
pub fn compile_checked(graph: &ResolvedGraph, issues: &Issues) -> Result<CanonicalModel> {
    if issues.has_errors() {
        return Err(ModelError::Blocked(issues.error_count()));
    }
    Ok(compile(graph))
}

impl CanonicalModel {
    /// Apply the canonical ordering in place; idempotent
    fn normalize(&mut self) {
        for entity in &mut self.entities {
            entity.fields = order_fields(std::mem::take(&mut entity.fields));
            entity.tags.sort();
            entity.tags.dedup();
        }
        self.entities.sort_by(compare_entities);

        self.relationships.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.from.cmp(&b.from))
                .then_with(|| a.to.cmp(&b.to))
                .then_with(|| a.cardinality.cmp(&b.cardinality))
        });
        self.indexes
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.entity.cmp(&b.entity)));

        for term in &mut self.glossary {
            term.related_fields.sort();
            term.related_fields.dedup();
            term.tags.sort();
            term.tags.dedup();
        }
        self.glossary.sort_by(|a, b| {
            a.term
                .cmp(&b.term)
                .then_with(|| a.definition.cmp(&b.definition))
        });

        self.rules
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.target.cmp(&b.target)));

        self.model.owners.sort();
        self.model.owners.dedup();
        self.model.imports.sort();
        self.model.imports.dedup();
    }

    /// Load a stored canonical model, rejecting anything not in canonical form
    pub fn from_json_str(text: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(text)?;
        let mut renormalized = parsed.clone();
        renormalized.normalize();

        if renormalized != parsed {
            return Err(ModelError::NotCanonical(format!(
                "model '{}' is not in canonical order",
                parsed.model.name
            )));
        }
        Ok(parsed)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// SHA-256 of the compact serialization
    pub fn checksum(&self) -> Result<Checksum> {
        Checksum::of(self)
    }

    pub fn entity(&self, name: &str) -> Option<&CanonicalEntity> {
        self.entities
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entities[i])
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats::from_model(self)
    }
}

fn compare_entities(a: &CanonicalEntity, b: &CanonicalEntity) -> Ordering {
    a.name.cmp(&b.name).then_with(|| a.kind.cmp(&b.kind))
}

/// Primary keys keep their declared order; everything else sorts by name
fn order_fields(fields: Vec<CanonicalField>) -> Vec<CanonicalField> {
    let (mut ordered, mut rest): (Vec<_>, Vec<_>) =
        fields.into_iter().partition(|f| f.primary_key);
    rest.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.field_type.cmp(&b.field_type))
    });
    ordered.extend(rest);
    ordered
}

fn sorted(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut items: Vec<String> = items.collect();
    items.sort();
    items.dedup();
    items
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

// =============================================================================
// Statistics
// =============================================================================

/// Counts over a canonical model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub model_name: String,
    pub version: String,
    pub entity_count: usize,
    pub entity_types: BTreeMap<String, usize>,
    pub total_fields: usize,
    pub primary_keys: usize,
    pub foreign_keys: usize,
    pub nullable_fields: usize,
    pub deprecated_fields: usize,
    pub described_fields: usize,
    pub relationship_count: usize,
    pub index_count: usize,
    pub glossary_terms: usize,
    pub rule_count: usize,
    pub subject_areas: Vec<String>,
    pub tags: Vec<String>,
}

impl ModelStats {
    pub fn from_model(model: &CanonicalModel) -> Self {
        let fields = || model.entities.iter().flat_map(|e| e.fields.iter());

        let mut entity_types = BTreeMap::new();
        for entity in &model.entities {
            *entity_types.entry(entity.kind.as_str().to_string()).or_insert(0) += 1;
        }

        Self {
            model_name: model.model.name.clone(),
            version: model.model.version.clone(),
            entity_count: model.entities.len(),
            entity_types,
            total_fields: fields().count(),
            primary_keys: fields().filter(|f| f.primary_key).count(),
            foreign_keys: fields().filter(|f| f.foreign_key).count(),
            nullable_fields: fields().filter(|f| f.nullable).count(),
            deprecated_fields: fields().filter(|f| f.deprecated).count(),
            described_fields: fields().filter(|f| f.description.is_some()).count(),
            relationship_count: model.relationships.len(),
            index_count: model.indexes.len(),
            glossary_terms: model.glossary.len(),
            rule_count: model.rules.len(),
            subject_areas: sorted(
                model
                    .entities
                    .iter()
                    .filter_map(|e| e.subject_area.clone()),
            ),
            tags: sorted(model.entities.iter().flat_map(|e| e.tags.iter().cloned())),
        }
    }

    /// Share of fields with a description, 0.0 for a model without fields
    pub fn description_coverage(&self) -> f64 {
        if self.total_fields == 0 {
            0.0
        } else {
            self.described_fields as f64 / self.total_fields as f64
        }
    }
}
