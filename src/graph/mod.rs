//! Resolved Model Graph
//!
//! The union of everything a root model and its transitive imports contribute,
//! each member tagged with the model that contributed it. Built once per
//! resolution by folding an ordered list of contributions; never mutated after.
//!
//! Shared by:
//! - the semantic validator (`crate::lint`)
//! - the canonical compiler (`crate::canonical`)
//! - project summaries (`summary`)

pub mod resolve;
pub mod summary;

pub use resolve::{resolve, resolve_standalone, ResolveOptions, Resolver};
pub use summary::{
    resolve_relationship_edges, CrossModelRelationship, EdgeReport, GraphSummary, ModelSummary,
    ResolvedEdge,
};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::issue::{escape_segment, IssueCode, Issues};
use crate::model::{
    Entity, Field, FieldRef, GlossaryTerm, Governance, ImportDecl, Index, ModelMeta, Relationship,
    Rule,
};

/// Name of a model (its `model.name`)
pub type ModelName = String;

// --- Provenance-tagged members ---

/// Entity as it appears in the resolved graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    /// Entity with its resolved (possibly alias-prefixed) name
    pub entity: Entity,
    /// Name as declared in its own model
    pub declared_name: String,
    /// Contributing model
    pub model: ModelName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ResolvedEntity {
    pub fn name(&self) -> &str {
        &self.entity.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRelationship {
    pub relationship: Relationship,
    pub model: ModelName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIndex {
    pub index: Index,
    pub model: ModelName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTerm {
    pub term: GlossaryTerm,
    pub model: ModelName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRule {
    pub rule: Rule,
    pub model: ModelName,
}

/// One model that took part in a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: ModelName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<PathBuf>,
    /// Names of directly imported models, in declaration order
    pub imports: Vec<ModelName>,
    /// Resolved names of entities this model contributed
    pub entities: Vec<String>,
    pub is_root: bool,
}

/// Edge weight of the import graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
}

impl From<&ImportDecl> for ImportEdge {
    fn from(decl: &ImportDecl) -> Self {
        Self {
            alias: decl.alias.clone(),
            entities: decl.entities.clone(),
        }
    }
}

// --- Contributions (input of the fold) ---

/// Everything one model document contributes through one import path.
///
/// Entities are already filtered by the allow-list and renamed by the alias.
/// References to entities the same contribution declares carry the alias too.
#[derive(Debug, Clone)]
pub(crate) struct Contribution {
    /// Distinct per (model, alias, allow-list) combination
    pub id: usize,
    pub model: ModelName,
    pub alias: Option<String>,
    /// (declared name, entity with resolved name)
    pub entities: Vec<(String, Entity)>,
    pub relationships: Vec<Relationship>,
    pub indexes: Vec<Index>,
    pub glossary: Vec<GlossaryTerm>,
    pub governance: Governance,
    pub rules: Vec<Rule>,
}

/// How an entity name resolves against the graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityLookup<'a> {
    /// Exact resolved name
    Found(&'a ResolvedEntity),
    /// Bare (declared) name of exactly one aliased entity
    ViaDeclaredName(&'a ResolvedEntity),
    /// Bare name shared by several aliased entities
    Ambiguous,
    Missing,
}

impl<'a> EntityLookup<'a> {
    pub fn entity(&self) -> Option<&'a ResolvedEntity> {
        match self {
            Self::Found(e) | Self::ViaDeclaredName(e) => Some(e),
            Self::Ambiguous | Self::Missing => None,
        }
    }
}

/// How an `Entity.Field` reference resolves
#[derive(Debug, Clone, PartialEq)]
pub enum FieldLookup<'a> {
    Found {
        entity: &'a ResolvedEntity,
        field: &'a Field,
    },
    /// Entity exists, field does not
    MissingField { entity: &'a ResolvedEntity },
    /// Not of the form `Entity.Field`
    Malformed,
    /// Well-formed, but the entity is unknown or ambiguous
    UnknownEntity { entity: String },
}

// =============================================================================
// Resolved Graph
// =============================================================================

/// Unified graph of a root model and its transitive imports
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    root: ModelName,
    meta: ModelMeta,
    entities: Vec<ResolvedEntity>,
    relationships: Vec<ResolvedRelationship>,
    indexes: Vec<ResolvedIndex>,
    glossary: Vec<ResolvedTerm>,
    governance: Governance,
    rules: Vec<ResolvedRule>,
    models: Vec<ModelInfo>,
    import_graph: DiGraph<ModelName, ImportEdge>,
    node_indices: HashMap<ModelName, NodeIndex>,
    issues: Issues,
}

impl ResolvedGraph {
    /// Fold ordered contributions into a graph.
    ///
    /// Same-name entities from two distinct models: last writer wins and a
    /// `DuplicateEntity` warning is recorded. The same model re-contributing
    /// through another import path replaces silently. Duplicates within one
    /// contribution are kept for the semantic validator to report.
    pub(crate) fn fold(
        meta: ModelMeta,
        models: Vec<ModelInfo>,
        edges: Vec<(ModelName, ModelName, ImportEdge)>,
        contributions: Vec<Contribution>,
        mut issues: Issues,
    ) -> Self {
        let mut entities: Vec<(usize, ResolvedEntity)> = Vec::new();
        let mut relationships: Vec<(usize, ResolvedRelationship)> = Vec::new();
        let mut indexes: Vec<(usize, ResolvedIndex)> = Vec::new();
        let mut glossary: Vec<(usize, ResolvedTerm)> = Vec::new();
        let mut rules: Vec<(usize, ResolvedRule)> = Vec::new();
        let mut governance = Governance::default();
        let mut contributed: BTreeMap<ModelName, Vec<String>> = BTreeMap::new();

        for contribution in contributions {
            let cid = contribution.id;
            let model = contribution.model;

            for (declared_name, entity) in contribution.entities {
                let names = contributed.entry(model.clone()).or_default();
                if !names.contains(&entity.name) {
                    names.push(entity.name.clone());
                }

                let previous: Vec<(usize, String)> = entities
                    .iter()
                    .filter(|(_, e)| e.entity.name == entity.name)
                    .map(|(c, e)| (*c, e.model.clone()))
                    .collect();

                let replace = if let Some((_, other)) =
                    previous.iter().find(|(_, m)| *m != model)
                {
                    tracing::warn!(
                        entity = %entity.name,
                        previous = %other,
                        winner = %model,
                        "entity contributed by two models"
                    );
                    issues.report(
                        IssueCode::DuplicateEntity,
                        format!("/entities/{}", escape_segment(&entity.name)),
                        format!(
                            "entity '{}' is contributed by both '{}' and '{}'; the definition from '{}' wins",
                            entity.name, other, model, model
                        ),
                    );
                    true
                } else {
                    previous.iter().any(|(c, _)| *c != cid)
                };

                if replace {
                    entities.retain(|(_, e)| e.entity.name != entity.name);
                }

                entities.push((
                    cid,
                    ResolvedEntity {
                        entity,
                        declared_name,
                        model: model.clone(),
                        alias: contribution.alias.clone(),
                    },
                ));
            }

            for relationship in contribution.relationships {
                replace_recontributed(&mut relationships, cid, &model, &relationship.name, |r| {
                    (&r.model, &r.relationship.name)
                });
                relationships.push((
                    cid,
                    ResolvedRelationship {
                        relationship,
                        model: model.clone(),
                    },
                ));
            }

            for index in contribution.indexes {
                replace_recontributed(&mut indexes, cid, &model, &index.name, |i| {
                    (&i.model, &i.index.name)
                });
                indexes.push((
                    cid,
                    ResolvedIndex {
                        index,
                        model: model.clone(),
                    },
                ));
            }

            for term in contribution.glossary {
                replace_recontributed(&mut glossary, cid, &model, &term.term, |t| {
                    (&t.model, &t.term.term)
                });
                glossary.push((
                    cid,
                    ResolvedTerm {
                        term,
                        model: model.clone(),
                    },
                ));
            }

            for rule in contribution.rules {
                replace_recontributed(&mut rules, cid, &model, &rule.name, |r| {
                    (&r.model, &r.rule.name)
                });
                rules.push((
                    cid,
                    ResolvedRule {
                        rule,
                        model: model.clone(),
                    },
                ));
            }

            governance
                .classification
                .extend(contribution.governance.classification);
            governance.stewards.extend(contribution.governance.stewards);
        }

        let models = models
            .into_iter()
            .map(|mut info| {
                info.entities = contributed.remove(&info.name).unwrap_or_default();
                info
            })
            .collect::<Vec<_>>();

        let mut import_graph = DiGraph::new();
        let mut node_indices = HashMap::new();
        for info in &models {
            let idx = import_graph.add_node(info.name.clone());
            node_indices.insert(info.name.clone(), idx);
        }
        for (from, to, edge) in edges {
            if let (Some(&a), Some(&b)) = (node_indices.get(&from), node_indices.get(&to)) {
                import_graph.add_edge(a, b, edge);
            }
        }

        let root = models
            .iter()
            .find(|m| m.is_root)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| meta.name.clone());

        Self {
            root,
            meta,
            entities: entities.into_iter().map(|(_, e)| e).collect(),
            relationships: relationships.into_iter().map(|(_, r)| r).collect(),
            indexes: indexes.into_iter().map(|(_, i)| i).collect(),
            glossary: glossary.into_iter().map(|(_, t)| t).collect(),
            governance,
            rules: rules.into_iter().map(|(_, r)| r).collect(),
            models,
            import_graph,
            node_indices,
            issues,
        }
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    /// Metadata of the root model
    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub fn entities(&self) -> &[ResolvedEntity] {
        &self.entities
    }

    pub fn relationships(&self) -> &[ResolvedRelationship] {
        &self.relationships
    }

    pub fn indexes(&self) -> &[ResolvedIndex] {
        &self.indexes
    }

    pub fn glossary(&self) -> &[ResolvedTerm] {
        &self.glossary
    }

    pub fn governance(&self) -> &Governance {
        &self.governance
    }

    pub fn rules(&self) -> &[ResolvedRule] {
        &self.rules
    }

    /// Participating models, root first, then in discovery order
    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Issues recorded during resolution (collisions, allow-list misses)
    pub fn issues(&self) -> &Issues {
        &self.issues
    }

    pub fn import_graph(&self) -> &DiGraph<ModelName, ImportEdge> {
        &self.import_graph
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Direct imports of a model
    pub fn imports_of(&self, model: &str) -> Vec<&ModelName> {
        let Some(&idx) = self.node_indices.get(model) else {
            return Vec::new();
        };
        let mut targets: Vec<_> = self
            .import_graph
            .edges(idx)
            .map(|e| (e.id(), e.target()))
            .collect();
        // petgraph yields outgoing edges newest first
        targets.sort_by_key(|(id, _)| *id);
        targets
            .into_iter()
            .filter_map(|(_, t)| self.import_graph.node_weight(t))
            .collect()
    }

    /// Models ordered so every model comes after everything it imports
    pub fn dependency_order(&self) -> Vec<&ModelName> {
        match toposort(&self.import_graph, None) {
            Ok(order) => order
                .into_iter()
                .rev()
                .filter_map(|idx| self.import_graph.node_weight(idx))
                .collect(),
            Err(_) => self.models.iter().map(|m| &m.name).collect(),
        }
    }

    /// Look up an entity by resolved name, falling back to its declared name.
    ///
    /// The fallback only applies to aliased entities and only when exactly
    /// one aliased entity carries that declared name.
    pub fn lookup_entity(&self, name: &str) -> EntityLookup<'_> {
        if let Some(entity) = self.entities.iter().rev().find(|e| e.entity.name == name) {
            return EntityLookup::Found(entity);
        }

        let mut candidates = self
            .entities
            .iter()
            .filter(|e| e.alias.is_some() && e.declared_name == name);

        match (candidates.next(), candidates.next()) {
            (Some(entity), None) => EntityLookup::ViaDeclaredName(entity),
            (Some(_), Some(_)) => EntityLookup::Ambiguous,
            (None, _) => EntityLookup::Missing,
        }
    }

    pub fn entity(&self, name: &str) -> Option<&ResolvedEntity> {
        self.lookup_entity(name).entity()
    }

    /// Resolve an `Entity.Field` reference string
    pub fn lookup_field(&self, reference: &str) -> FieldLookup<'_> {
        let Some(parsed) = FieldRef::parse(reference) else {
            return FieldLookup::Malformed;
        };

        match self.lookup_entity(&parsed.entity).entity() {
            Some(entity) => match entity.entity.field(&parsed.field) {
                Some(field) => FieldLookup::Found { entity, field },
                None => FieldLookup::MissingField { entity },
            },
            None => FieldLookup::UnknownEntity {
                entity: parsed.entity,
            },
        }
    }

    /// Rewrite a reference to use the entity's resolved name
    pub fn normalize_reference(&self, reference: &str) -> String {
        match self.lookup_field(reference) {
            FieldLookup::Found { entity, field } => format!("{}.{}", entity.name(), field.name),
            FieldLookup::MissingField { entity } => match FieldRef::parse(reference) {
                Some(parsed) => format!("{}.{}", entity.name(), parsed.field),
                None => reference.trim().to_string(),
            },
            _ => reference.trim().to_string(),
        }
    }

    /// Close matches for an unknown entity name, best first
    pub fn suggest_entities(&self, name: &str, limit: usize) -> Vec<&str> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, &str)> = self
            .entities
            .iter()
            .filter_map(|e| {
                matcher
                    .fuzzy_match(e.name(), name)
                    .map(|score| (score, e.name()))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.dedup_by(|a, b| a.1 == b.1);
        scored.into_iter().take(limit).map(|(_, n)| n).collect()
    }

    /// Export the import graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph ModelImports {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n");
        output.push('\n');

        for info in &self.models {
            let shape = if info.is_root { ", penwidth=2" } else { "" };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{} entities\"{}];\n",
                info.name,
                info.name,
                info.entities.len(),
                shape
            ));
        }

        output.push('\n');

        let mut edges: Vec<_> = self.import_graph.edge_references().collect();
        edges.sort_by_key(|e| e.id());
        for edge in edges {
            if let (Some(source), Some(target)) = (
                self.import_graph.node_weight(edge.source()),
                self.import_graph.node_weight(edge.target()),
            ) {
                match &edge.weight().alias {
                    Some(alias) => output.push_str(&format!(
                        "  \"{}\" -> \"{}\" [label=\"as {}\"];\n",
                        source, target, alias
                    )),
                    None => output.push_str(&format!("  \"{}\" -> \"{}\";\n", source, target)),
                }
            }
        }

        output.push_str("}\n");
        output
    }
}

/// Drop members a model re-contributes through a different import path
fn replace_recontributed<T>(
    items: &mut Vec<(usize, T)>,
    cid: usize,
    model: &str,
    name: &str,
    key: impl Fn(&T) -> (&ModelName, &String),
) {
    items.retain(|(c, item)| {
        let (m, n) = key(item);
        !(*c != cid && m == model && n == name)
    });
}
