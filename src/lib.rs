//! DataLex Model Engine
//!
//! Resolution, validation, canonicalization and breaking-change diffing for
//! declarative data models (entities, relationships, indexes, glossary,
//! governance metadata and business rules) spread over files that import one
//! another.
//!
//! ## Pipeline
//!
//! ```text
//! ModelDocument ──structural──▶ Resolver ──▶ ResolvedGraph ──lint──▶ Issues
//!                                                 │
//!                                                 ▼
//!                                          CanonicalModel ──diff──▶ ChangeReport
//! ```
//!
//! - **Structural validation** checks one document against the bundled schema
//! - **Resolution** follows imports through a [`DocumentLoader`], applying
//!   aliases and entity allow-lists, and folds everything into one graph
//! - **Semantic validation** checks references and business rules graph-wide
//! - **Compilation** sorts and normalizes the graph into a [`CanonicalModel`]
//! - **Diffing** compares two canonical models and classifies each change
//!
//! Every stage is a pure function of its inputs; the loader is the only
//! place that touches the filesystem.

pub mod canonical;
pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod issue;
pub mod lint;
pub mod loader;
pub mod model;
pub mod structural;
pub mod version;

pub use canonical::{compile, compile_checked, CanonicalModel, ModelStats};
pub use checksum::Checksum;
pub use compatibility::{
    diff, ChangeReport, CompatibilityChecker, ProjectDiff, WideningPolicy,
};
pub use config::DatalexConfig;
pub use document::ModelDocument;
pub use error::{LoadError, ModelError, ResolutionError, Result};
pub use graph::{
    resolve, resolve_standalone, GraphSummary, ResolveOptions, ResolvedGraph, Resolver,
};
pub use issue::{Issue, IssueCode, Issues, Severity};
pub use lint::{lint_graph, SemanticValidator};
pub use loader::{DocumentLoader, FileSystemLoader, MemoryLoader};
pub use model::{Entity, EntityKind, Field, FieldType, ModelFile};
pub use structural::validate_document;
pub use version::VersionBump;

/// Everything needed to turn a root document into a canonical model
#[derive(Debug, Clone)]
pub struct Verified {
    pub graph: ResolvedGraph,
    /// Resolution issues followed by semantic issues
    pub issues: Issues,
}

impl Verified {
    /// Run the semantic validator over an already resolved graph
    pub fn from_graph(graph: ResolvedGraph) -> Self {
        let mut issues = graph.issues().clone();
        issues.merge(lint_graph(&graph));
        Self { graph, issues }
    }

    pub fn has_errors(&self) -> bool {
        self.issues.has_errors()
    }

    /// Compile, refusing when any error was found
    pub fn compile(&self) -> Result<CanonicalModel> {
        compile_checked(&self.graph, &self.issues)
    }
}

/// Resolve `root` through `loader` and run the semantic validator
pub fn verify<L>(root: &ModelDocument, loader: &L, options: &ResolveOptions) -> Result<Verified>
where
    L: DocumentLoader + ?Sized,
{
    let graph = Resolver::new(loader)
        .with_options(options.clone())
        .resolve(root)?;
    Ok(Verified::from_graph(graph))
}
