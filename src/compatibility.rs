//! Model compatibility checking
//!
//! Diffs two canonical models collection by collection and classifies every
//! change as breaking or not. Output is sorted by identity key so two runs
//! over the same inputs serialize byte-identically.
//!
//! Breaking:
//! - entity, field, relationship or index removed
//! - field `nullable` true -> false
//! - field `type` changed, unless both types share a widening-safe group
//! - field `primary_key` true -> false
//!
//! Everything else, additions included, is non-breaking. Rules are keyed
//! `name@target`; dropping one loosens the model and is not breaking. Newly added
//! uniqueness or primary keys are reported as notices.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::{CanonicalEntity, CanonicalField, CanonicalModel};
use crate::model::FieldType;
use crate::version::VersionBump;

// =============================================================================
// Widening Policy
// =============================================================================

/// Groups of field types that may replace one another without breaking readers.
///
/// Types are compared in canonical spelling; a group entry without parameters
/// (`varchar`) also covers its parameterized forms (`varchar(20)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WideningPolicy {
    groups: Vec<BTreeSet<String>>,
}

impl WideningPolicy {
    /// No type change is safe
    pub fn new() -> Self {
        Self::default()
    }

    /// Common lossless widenings between recognized types
    pub fn standard() -> Self {
        Self::new()
            .with_group(["smallint", "integer", "bigint"])
            .with_group(["float", "double"])
            .with_group(["char", "varchar", "string"])
            .with_group(["timestamp", "timestamptz"])
            .with_group(["json", "jsonb"])
    }

    pub fn with_group<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let group: BTreeSet<String> = types
            .into_iter()
            .map(|t| FieldType::parse(t.as_ref()).as_str().to_string())
            .collect();
        if !group.is_empty() {
            self.groups.push(group);
        }
        self
    }

    pub fn from_groups(groups: &[Vec<String>]) -> Self {
        groups
            .iter()
            .fold(Self::new(), |policy, group| policy.with_group(group))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether changing `old` to `new` is safe under this policy
    pub fn is_safe(&self, old: &FieldType, new: &FieldType) -> bool {
        let covers = |group: &BTreeSet<String>, ty: &FieldType| {
            group.contains(ty.as_str()) || group.contains(ty.base())
        };
        self.groups
            .iter()
            .any(|group| covers(group, old) && covers(group, new))
    }
}

// =============================================================================
// Change Report
// =============================================================================

/// One attribute that differs between two versions of a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub field: String,
    #[serde(rename = "oldValue")]
    pub old_value: Value,
    #[serde(rename = "newValue")]
    pub new_value: Value,
    pub breaking: bool,
}

/// A member present in both models with differing attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub key: String,
    pub changes: Vec<AttributeChange>,
}

impl Modification {
    pub fn is_breaking(&self) -> bool {
        self.changes.iter().any(|c| c.breaking)
    }
}

/// Added, removed and modified members of one collection, sorted by key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<Modification>,
}

impl CollectionChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionChange {
    pub old: String,
    pub new: String,
    pub bump: VersionBump,
}

/// Result of comparing two canonical models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub model: String,
    pub version: VersionChange,
    pub entities: CollectionChanges,
    /// Keyed `Entity.Field`; only entities present in both models
    pub fields: CollectionChanges,
    pub relationships: CollectionChanges,
    pub indexes: CollectionChanges,
    pub glossary: CollectionChanges,
    /// Keyed `name@target`
    #[serde(default)]
    pub rules: CollectionChanges,
    pub breaking: bool,
    #[serde(rename = "breakingReasons")]
    pub breaking_reasons: Vec<String>,
    /// Informational findings that never make a change breaking
    pub notices: Vec<String>,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        self.collections().iter().all(|(_, c)| c.is_empty())
    }

    pub fn change_count(&self) -> usize {
        self.collections().iter().map(|(_, c)| c.len()).sum()
    }

    /// Collections with their display names, in report order
    pub fn collections(&self) -> [(&'static str, &CollectionChanges); 6] {
        [
            ("entities", &self.entities),
            ("fields", &self.fields),
            ("relationships", &self.relationships),
            ("indexes", &self.indexes),
            ("glossary", &self.glossary),
            ("rules", &self.rules),
        ]
    }
}

// =============================================================================
// Checker
// =============================================================================

/// Diff engine with an injected widening policy
#[derive(Debug, Clone, Default)]
pub struct CompatibilityChecker {
    widening: WideningPolicy,
    /// Any change at all is breaking
    strict_mode: bool,
}

impl CompatibilityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_widening(mut self, widening: WideningPolicy) -> Self {
        self.widening = widening;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    /// Compare two canonical models
    pub fn diff(&self, old: &CanonicalModel, new: &CanonicalModel) -> ChangeReport {
        let mut reasons = Vec::new();
        let mut notices = Vec::new();

        let entities = keyed_changes(
            &old.entities,
            &new.entities,
            |e| e.name.clone(),
            |a, b| entity_changes(a, b),
        );
        for key in &entities.removed {
            reasons.push(format!("Entity '{}' removed", key));
        }
        for modification in &entities.modified {
            if let Some(kind) = modification.changes.iter().find(|c| c.field == "type") {
                notices.push(format!(
                    "Entity '{}' changed kind from {} to {}",
                    modification.key, kind.old_value, kind.new_value
                ));
            }
        }

        let fields = self.field_changes(old, new, &mut reasons, &mut notices);

        let relationships = keyed_changes(
            &old.relationships,
            &new.relationships,
            |r| r.name.clone(),
            |a, b| {
                let mut changes = Vec::new();
                attribute(&mut changes, "from", &a.from, &b.from, false);
                attribute(&mut changes, "to", &a.to, &b.to, false);
                attribute(&mut changes, "cardinality", &a.cardinality, &b.cardinality, false);
                attribute(&mut changes, "description", &a.description, &b.description, false);
                changes
            },
        );
        for key in &relationships.removed {
            reasons.push(format!("Relationship '{}' removed", key));
        }

        let indexes = keyed_changes(
            &old.indexes,
            &new.indexes,
            |i| i.name.clone(),
            |a, b| {
                let mut changes = Vec::new();
                attribute(&mut changes, "entity", &a.entity, &b.entity, false);
                attribute(&mut changes, "fields", &a.fields, &b.fields, false);
                attribute(&mut changes, "unique", &a.unique, &b.unique, false);
                attribute(&mut changes, "type", &a.index_type, &b.index_type, false);
                changes
            },
        );
        for key in &indexes.removed {
            reasons.push(format!("Index '{}' removed", key));
        }
        for modification in &indexes.modified {
            if modification
                .changes
                .iter()
                .any(|c| c.field == "unique" && c.new_value == Value::Bool(true))
            {
                notices.push(format!("Index '{}' became unique", modification.key));
            }
        }
        for key in &indexes.added {
            if new.indexes.iter().any(|i| &i.name == key && i.unique) {
                notices.push(format!("Unique index '{}' added", key));
            }
        }

        let glossary = keyed_changes(
            &old.glossary,
            &new.glossary,
            |t| t.term.clone(),
            |a, b| {
                let mut changes = Vec::new();
                attribute(&mut changes, "definition", &a.definition, &b.definition, false);
                attribute(&mut changes, "related_fields", &a.related_fields, &b.related_fields, false);
                attribute(&mut changes, "tags", &a.tags, &b.tags, false);
                changes
            },
        );

        let rules = keyed_changes(
            &old.rules,
            &new.rules,
            |r| format!("{}@{}", r.name, r.target),
            |a, b| {
                let mut changes = Vec::new();
                attribute(&mut changes, "expression", &a.expression, &b.expression, false);
                attribute(&mut changes, "severity", &a.severity, &b.severity, false);
                attribute(&mut changes, "description", &a.description, &b.description, false);
                changes
            },
        );

        let version = VersionChange {
            old: old.model.version.clone(),
            new: new.model.version.clone(),
            bump: VersionBump::between(&old.model.version, &new.model.version),
        };

        let mut report = ChangeReport {
            model: new.model.name.clone(),
            version,
            entities,
            fields,
            relationships,
            indexes,
            glossary,
            rules,
            breaking: false,
            breaking_reasons: reasons,
            notices,
        };

        if self.strict_mode && report.breaking_reasons.is_empty() && !report.is_empty() {
            report.breaking_reasons.push(format!(
                "Strict mode: {} change(s) detected",
                report.change_count()
            ));
        }
        report.breaking = !report.breaking_reasons.is_empty();

        if report.breaking && !report.version.bump.allows_breaking() {
            report.notices.push(format!(
                "Breaking changes without a major version bump ({} -> {}, {})",
                report.version.old, report.version.new, report.version.bump
            ));
        }

        tracing::info!(
            model = %report.model,
            changes = report.change_count(),
            breaking = report.breaking,
            "diffed canonical models"
        );
        report
    }

    fn field_changes(
        &self,
        old: &CanonicalModel,
        new: &CanonicalModel,
        reasons: &mut Vec<String>,
        notices: &mut Vec<String>,
    ) -> CollectionChanges {
        let old_fields = shared_entity_fields(old, new);
        let new_fields = shared_entity_fields(new, old);

        let changes = keyed_changes(
            &old_fields,
            &new_fields,
            |(entity, field)| format!("{}.{}", entity, field.name),
            |(_, a), (_, b)| self.compare_fields(a, b),
        );

        for key in &changes.removed {
            reasons.push(format!("Field '{}' removed", key));
        }
        for key in &changes.added {
            let added = new_fields
                .iter()
                .find(|(entity, field)| format!("{}.{}", entity, field.name) == *key)
                .map(|(_, field)| *field);
            match added {
                Some(field) if field.primary_key => {
                    notices.push(format!("Field '{}' added as primary key", key))
                }
                Some(field) if field.unique => {
                    notices.push(format!("Field '{}' added as unique", key))
                }
                Some(field) if !field.nullable => notices.push(format!(
                    "Field '{}' added as non-nullable; existing rows need a value",
                    key
                )),
                _ => {}
            }
        }

        for modification in &changes.modified {
            for change in &modification.changes {
                let key = &modification.key;
                match (change.field.as_str(), change.breaking) {
                    ("type", true) => reasons.push(format!(
                        "Field '{}' type changed from {} to {}",
                        key, change.old_value, change.new_value
                    )),
                    ("type", false) => notices.push(format!(
                        "Field '{}' type widened from {} to {}",
                        key, change.old_value, change.new_value
                    )),
                    ("nullable", true) => reasons.push(format!(
                        "Field '{}' changed from nullable to non-nullable",
                        key
                    )),
                    ("nullable", false) => {
                        notices.push(format!("Field '{}' became nullable", key))
                    }
                    ("primary_key", true) => {
                        reasons.push(format!("Field '{}' is no longer a primary key", key))
                    }
                    ("primary_key", false) => {
                        notices.push(format!("Field '{}' became a primary key", key))
                    }
                    ("unique", _) if change.new_value == Value::Bool(true) => {
                        notices.push(format!("Field '{}' became unique", key))
                    }
                    _ => {}
                }
            }
        }

        changes
    }

    fn compare_fields(&self, a: &CanonicalField, b: &CanonicalField) -> Vec<AttributeChange> {
        let mut changes = Vec::new();
        let type_breaks = !self.widening.is_safe(&a.field_type, &b.field_type);

        attribute(&mut changes, "type", &a.field_type, &b.field_type, type_breaks);
        attribute(&mut changes, "nullable", &a.nullable, &b.nullable, a.nullable && !b.nullable);
        attribute(
            &mut changes,
            "primary_key",
            &a.primary_key,
            &b.primary_key,
            a.primary_key && !b.primary_key,
        );
        attribute(&mut changes, "unique", &a.unique, &b.unique, false);
        attribute(&mut changes, "foreign_key", &a.foreign_key, &b.foreign_key, false);
        attribute(&mut changes, "computed", &a.computed, &b.computed, false);
        attribute(
            &mut changes,
            "computed_expression",
            &a.computed_expression,
            &b.computed_expression,
            false,
        );
        attribute(&mut changes, "deprecated", &a.deprecated, &b.deprecated, false);
        attribute(
            &mut changes,
            "deprecated_message",
            &a.deprecated_message,
            &b.deprecated_message,
            false,
        );
        attribute(&mut changes, "sensitivity", &a.sensitivity, &b.sensitivity, false);
        attribute(&mut changes, "description", &a.description, &b.description, false);
        changes
    }
}

/// Diff with the default checker (no widening-safe types)
pub fn diff(old: &CanonicalModel, new: &CanonicalModel) -> ChangeReport {
    CompatibilityChecker::new().diff(old, new)
}

fn entity_changes(a: &CanonicalEntity, b: &CanonicalEntity) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    attribute(&mut changes, "type", &a.kind, &b.kind, false);
    attribute(&mut changes, "tags", &a.tags, &b.tags, false);
    attribute(&mut changes, "description", &a.description, &b.description, false);
    attribute(&mut changes, "schema", &a.schema, &b.schema, false);
    attribute(&mut changes, "database", &a.database, &b.database, false);
    attribute(&mut changes, "subject_area", &a.subject_area, &b.subject_area, false);
    attribute(&mut changes, "owner", &a.owner, &b.owner, false);
    attribute(&mut changes, "sla", &a.sla, &b.sla, false);
    changes
}

/// Fields of entities of `model` that `other` also declares
fn shared_entity_fields<'a>(
    model: &'a CanonicalModel,
    other: &CanonicalModel,
) -> Vec<(&'a str, &'a CanonicalField)> {
    model
        .entities
        .iter()
        .filter(|e| other.entity(&e.name).is_some())
        .flat_map(|e| e.fields.iter().map(move |f| (e.name.as_str(), f)))
        .collect()
}

fn attribute<T: PartialEq + Serialize>(
    changes: &mut Vec<AttributeChange>,
    field: &str,
    old: &T,
    new: &T,
    breaking: bool,
) {
    if old != new {
        changes.push(AttributeChange {
            field: field.to_string(),
            old_value: to_value(old),
            new_value: to_value(new),
            breaking,
        });
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Set difference and attribute comparison by identity key
fn keyed_changes<T>(
    old: &[T],
    new: &[T],
    key: impl Fn(&T) -> String,
    compare: impl Fn(&T, &T) -> Vec<AttributeChange>,
) -> CollectionChanges {
    let old_map: BTreeMap<String, &T> = old.iter().map(|item| (key(item), item)).collect();
    let new_map: BTreeMap<String, &T> = new.iter().map(|item| (key(item), item)).collect();

    let mut changes = CollectionChanges::default();
    for (k, old_item) in &old_map {
        match new_map.get(k) {
            None => changes.removed.push(k.clone()),
            Some(new_item) => {
                let attributes = compare(old_item, new_item);
                if !attributes.is_empty() {
                    changes.modified.push(Modification {
                        key: k.clone(),
                        changes: attributes,
                    });
                }
            }
        }
    }
    changes.added = new_map
        .keys()
        .filter(|k| !old_map.contains_key(*k))
        .cloned()
        .collect();
    changes
}

// =============================================================================
// Project Diff
// =============================================================================

/// Comparison of two sets of canonical models keyed by model name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDiff {
    pub added_models: Vec<String>,
    pub removed_models: Vec<String>,
    pub changed_models: Vec<String>,
    pub unchanged_models: Vec<String>,
    pub reports: BTreeMap<String, ChangeReport>,
    pub breaking: bool,
    #[serde(rename = "breakingReasons")]
    pub breaking_reasons: Vec<String>,
}

impl CompatibilityChecker {
    /// Diff every model present on either side
    pub fn diff_projects(
        &self,
        old: &BTreeMap<String, CanonicalModel>,
        new: &BTreeMap<String, CanonicalModel>,
    ) -> ProjectDiff {
        let mut project = ProjectDiff {
            added_models: new.keys().filter(|k| !old.contains_key(*k)).cloned().collect(),
            removed_models: old.keys().filter(|k| !new.contains_key(*k)).cloned().collect(),
            changed_models: Vec::new(),
            unchanged_models: Vec::new(),
            reports: BTreeMap::new(),
            breaking: false,
            breaking_reasons: Vec::new(),
        };

        for name in &project.removed_models {
            project
                .breaking_reasons
                .push(format!("Model '{}' removed", name));
        }

        for (name, old_model) in old {
            let Some(new_model) = new.get(name) else {
                continue;
            };
            let report = self.diff(old_model, new_model);
            if report.is_empty() {
                project.unchanged_models.push(name.clone());
                continue;
            }
            project.breaking_reasons.extend(
                report
                    .breaking_reasons
                    .iter()
                    .map(|reason| format!("[{}] {}", name, reason)),
            );
            project.changed_models.push(name.clone());
            project.reports.insert(name.clone(), report);
        }

        project.breaking = !project.breaking_reasons.is_empty();
        project
    }
}
