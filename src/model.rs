//! Model types
//!
//! Typed representation of one model document. Documents are first checked by
//! the structural validator as raw JSON and only then lifted into these types,
//! so deserialization here can assume a well-shaped input.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// A complete model file: metadata plus everything it declares directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub model: ModelMeta,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub glossary: Vec<GlossaryTerm>,
    #[serde(default)]
    pub governance: Governance,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// `model:` block of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Unique within a resolution scope
    pub name: String,
    /// Semantic version string
    pub version: String,
    pub domain: String,
    #[serde(default)]
    pub owners: Vec<String>,
    pub state: LifecycleState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Model lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Draft,
    Approved,
    Deprecated,
}

/// One entry of `model.imports`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    /// Logical name of the imported model
    pub model: String,
    /// Optional file path, relative to the importing document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Prefix applied to every entity this import contributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Entity allow-list; `None` pulls in everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
}

impl ImportDecl {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            path: None,
            alias: None,
            entities: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = Some(entities.into_iter().map(Into::into).collect());
        self
    }

    /// Name an entity from this import resolves to
    pub fn qualify(&self, entity: &str) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{}", alias, entity),
            None => entity.to_string(),
        }
    }

    /// Whether the allow-list admits `entity`
    pub fn admits(&self, entity: &str) -> bool {
        self.entities
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|e| e == entity))
    }
}

// =============================================================================
// Entities and Fields
// =============================================================================

/// Kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Table,
    View,
    MaterializedView,
    ExternalTable,
    Snapshot,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::MaterializedView => "materialized_view",
            Self::ExternalTable => "external_table",
            Self::Snapshot => "snapshot",
        }
    }

    /// Only plain tables must declare a primary key
    pub fn requires_primary_key(&self) -> bool {
        matches!(self, Self::Table)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: EntityKind,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Free-form service level block (freshness, availability, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla: Option<serde_json::Value>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: Vec::new(),
            tags: Vec::new(),
            description: None,
            schema: None,
            database: None,
            subject_area: None,
            owner: None,
            sla: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_primary_key(&self) -> bool {
        self.fields.iter().any(Field::is_primary_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            nullable: None,
            primary_key: None,
            unique: None,
            foreign_key: None,
            computed: None,
            computed_expression: None,
            deprecated: None,
            deprecated_message: None,
            sensitivity: None,
            description: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = Some(true);
        self.nullable = Some(false);
        self
    }

    /// Primary keys default to non-nullable, everything else to nullable
    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(!self.is_primary_key())
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key.unwrap_or(false)
    }

    pub fn is_unique(&self) -> bool {
        self.unique.unwrap_or(false)
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.unwrap_or(false)
    }

    pub fn is_computed(&self) -> bool {
        self.computed.unwrap_or(false)
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated.unwrap_or(false)
    }
}

// =============================================================================
// Field Types
// =============================================================================

/// Recognized type families; anything else is a vendor-specific type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFamily {
    Integer,
    Decimal,
    Float,
    String,
    Boolean,
    Temporal,
    Uuid,
    Json,
    Binary,
}

/// Field type from an open vocabulary, held in canonical spelling.
///
/// Case and spacing variants (`VARCHAR ( 20 )`, `varchar(20)`) and common
/// synonyms (`int4`, `INTEGER`) compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldType(String);

const TYPE_SYNONYMS: &[(&str, &str)] = &[
    ("int", "integer"),
    ("int4", "integer"),
    ("integer", "integer"),
    ("int8", "bigint"),
    ("long", "bigint"),
    ("bigint", "bigint"),
    ("int2", "smallint"),
    ("smallint", "smallint"),
    ("bool", "boolean"),
    ("boolean", "boolean"),
    ("text", "string"),
    ("string", "string"),
    ("character varying", "varchar"),
    ("varchar", "varchar"),
    ("character", "char"),
    ("char", "char"),
    ("real", "float"),
    ("float4", "float"),
    ("float", "float"),
    ("float8", "double"),
    ("double precision", "double"),
    ("double", "double"),
    ("numeric", "decimal"),
    ("decimal", "decimal"),
    ("datetime", "timestamp"),
    ("timestamp without time zone", "timestamp"),
    ("timestamp", "timestamp"),
    ("timestamp with time zone", "timestamptz"),
    ("timestamptz", "timestamptz"),
    ("date", "date"),
    ("time", "time"),
    ("uuid", "uuid"),
    ("json", "json"),
    ("jsonb", "jsonb"),
    ("bytea", "binary"),
    ("blob", "binary"),
    ("binary", "binary"),
];

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn punctuation_spacing() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*([(),])\s*").expect("static regex"))
}

impl FieldType {
    /// Canonicalize a raw type string
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        let collapsed = whitespace().replace_all(&lowered, " ");
        let tight = punctuation_spacing().replace_all(&collapsed, "$1");

        let (base, params) = match tight.find('(') {
            Some(pos) => (&tight[..pos], &tight[pos..]),
            None => (&tight[..], ""),
        };

        let base = TYPE_SYNONYMS
            .iter()
            .find(|(alias, _)| *alias == base)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(base);

        Self(format!("{}{}", base, params))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Type name without parameters, e.g. `varchar` for `varchar(20)`
    pub fn base(&self) -> &str {
        self.0.split('(').next().unwrap_or(&self.0)
    }

    pub fn family(&self) -> Option<TypeFamily> {
        let family = match self.base() {
            "integer" | "bigint" | "smallint" => TypeFamily::Integer,
            "decimal" => TypeFamily::Decimal,
            "float" | "double" => TypeFamily::Float,
            "string" | "varchar" | "char" => TypeFamily::String,
            "boolean" => TypeFamily::Boolean,
            "timestamp" | "timestamptz" | "date" | "time" => TypeFamily::Temporal,
            "uuid" => TypeFamily::Uuid,
            "json" | "jsonb" => TypeFamily::Json,
            "binary" => TypeFamily::Binary,
            _ => return None,
        };
        Some(family)
    }

    /// Whether the type is one of the recognized canonical forms
    pub fn is_recognized(&self) -> bool {
        self.family().is_some()
    }
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for FieldType {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.0
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Relationships, Indexes, Glossary, Governance
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    /// `Entity.Field`
    pub from: String,
    /// `Entity.Field`
    pub to: String,
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub entity: String,
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub term: String,
    pub definition: String,
    /// Links to `Entity.Field` members described by this term
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Governance map keyed by `Entity.Field`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Governance {
    #[serde(default)]
    pub classification: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stewards: BTreeMap<String, String>,
}

/// Named business rule attached to an entity or one of its fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// `Entity` or `Entity.Field`
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// =============================================================================
// Field References
// =============================================================================

/// Parsed `Entity.Field` reference.
///
/// The field is everything after the last dot, so aliased entity names
/// (`sales.Orders.id`) parse with `sales.Orders` as the entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub entity: String,
    pub field: String,
}

impl FieldRef {
    /// `None` when the reference is not of the form `Entity.Field`
    pub fn parse(reference: &str) -> Option<Self> {
        let (entity, field) = reference.trim().rsplit_once('.')?;
        if entity.is_empty() || field.is_empty() {
            return None;
        }
        Some(Self {
            entity: entity.to_string(),
            field: field.to_string(),
        })
    }

    pub fn new(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.field)
    }
}
