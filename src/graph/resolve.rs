//! Import Resolution
//!
//! Depth-first walk of the import graph from a root document. Models live in
//! an arena addressed by index; the active path is an explicit stack of frames,
//! so cycle reporting is a slice of that stack and deep import chains cannot
//! overflow the call stack.
//!
//! Merge order per model: each import in declaration order (fully resolved
//! before the next), then the model's own declarations. That order decides
//! which definition wins a cross-model name collision.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::document::ModelDocument;
use crate::error::{LoadError, ResolutionError};
use crate::issue::{escape_segment, Issue, IssueCode, Issues};
use crate::loader::{DocumentLoader, ImportRequest, NoImports};
use crate::model::{
    FieldRef, GlossaryTerm, Governance, ImportDecl, Index, ModelFile, Relationship, Rule,
};
use crate::structural::validate_document;

use super::{Contribution, ImportEdge, ModelInfo, ModelName, ResolvedGraph};

/// Resolver settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Longest import chain below the root
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { max_depth: 32 }
    }
}

/// Resolve `root` and everything it imports through `loader`
pub fn resolve<L>(root: &ModelDocument, loader: &L) -> Result<ResolvedGraph, ResolutionError>
where
    L: DocumentLoader + ?Sized,
{
    Resolver::new(loader).resolve(root)
}

/// Resolve a document that is not expected to import anything
pub fn resolve_standalone(root: &ModelDocument) -> Result<ResolvedGraph, ResolutionError> {
    Resolver::new(&NoImports).resolve(root)
}

/// Import resolver bound to a document loader
pub struct Resolver<'l, L: DocumentLoader + ?Sized> {
    loader: &'l L,
    options: ResolveOptions,
}

impl<'l, L: DocumentLoader + ?Sized> Resolver<'l, L> {
    pub fn new(loader: &'l L) -> Self {
        Self {
            loader,
            options: ResolveOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resolve(&self, root: &ModelDocument) -> Result<ResolvedGraph, ResolutionError> {
        let mut warnings = Issues::new();
        let root_file = lift(root, root.display_name(), &mut warnings)?;
        let mut walk = Walk::new(root, root_file);
        walk.issues.merge(warnings);

        walk.run(self.loader, &self.options)?;

        let graph = walk.finish();
        tracing::info!(
            root = %graph.root_name(),
            models = graph.models().len(),
            entities = graph.entity_count(),
            issues = graph.issues().len(),
            "resolved model graph"
        );
        Ok(graph)
    }
}

/// Structurally validate a document and lift it into the typed model
fn lift(
    document: &ModelDocument,
    label: String,
    warnings: &mut Issues,
) -> Result<ModelFile, ResolutionError> {
    let issues = validate_document(document);
    if issues.has_errors() {
        return Err(ResolutionError::StructuralError {
            model: label,
            issues: issues.into(),
        });
    }

    let file = document.to_model().map_err(|e| ResolutionError::StructuralError {
        model: label.clone(),
        issues: vec![Issue::new(IssueCode::MalformedDocument, "/", e.to_string())],
    })?;

    warnings.merge(issues);
    Ok(file)
}

// =============================================================================
// Traversal State
// =============================================================================

struct Loaded {
    name: ModelName,
    origin: Option<PathBuf>,
    file: ModelFile,
}

struct Frame {
    model: usize,
    /// Import declaration that led here; `None` for the root
    via: Option<ImportDecl>,
    next: usize,
    depth: usize,
}

/// Key deciding whether a model already contributed through an equivalent import
type ContributionKey = (usize, Option<String>, Option<Vec<String>>);

struct Walk {
    arena: Vec<Loaded>,
    /// Import reference (model name) -> arena index
    by_reference: HashMap<String, usize>,
    /// Declared model name -> arena index
    by_name: HashMap<ModelName, usize>,
    on_stack: Vec<bool>,
    finished: Vec<bool>,
    stack: Vec<Frame>,
    edges: Vec<(ModelName, ModelName, ImportEdge)>,
    contribution_ids: HashMap<ContributionKey, usize>,
    contributions: Vec<Contribution>,
    issues: Issues,
}

impl Walk {
    fn new(root: &ModelDocument, file: ModelFile) -> Self {
        let name = file.model.name.clone();
        let mut walk = Self {
            arena: Vec::new(),
            by_reference: HashMap::new(),
            by_name: HashMap::new(),
            on_stack: Vec::new(),
            finished: Vec::new(),
            stack: Vec::new(),
            edges: Vec::new(),
            contribution_ids: HashMap::new(),
            contributions: Vec::new(),
            issues: Issues::new(),
        };
        let idx = walk.push_model(name.clone(), root.origin().map(PathBuf::from), file);
        walk.by_reference.insert(name, idx);
        walk.on_stack[idx] = true;
        walk.stack.push(Frame {
            model: idx,
            via: None,
            next: 0,
            depth: 0,
        });
        walk
    }

    fn push_model(&mut self, name: ModelName, origin: Option<PathBuf>, file: ModelFile) -> usize {
        let idx = self.arena.len();
        self.by_name.insert(name.clone(), idx);
        self.arena.push(Loaded { name, origin, file });
        self.on_stack.push(false);
        self.finished.push(false);
        idx
    }

    fn chain(&self) -> Vec<String> {
        self.stack
            .iter()
            .map(|f| self.arena[f.model].name.clone())
            .collect()
    }

    fn run<L>(&mut self, loader: &L, options: &ResolveOptions) -> Result<(), ResolutionError>
    where
        L: DocumentLoader + ?Sized,
    {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(());
            };
            let model = frame.model;
            let depth = frame.depth;
            let next = self.arena[model].file.model.imports.get(frame.next).cloned();

            match next {
                Some(import) => {
                    frame.next += 1;
                    self.visit(loader, options, model, depth + 1, import)?;
                }
                None => {
                    if let Some(done) = self.stack.pop() {
                        self.on_stack[done.model] = false;
                        self.finished[done.model] = true;
                        self.contribute(done.model, done.via.as_ref());
                    }
                }
            }
        }
    }

    fn visit<L>(
        &mut self,
        loader: &L,
        options: &ResolveOptions,
        importer: usize,
        depth: usize,
        import: ImportDecl,
    ) -> Result<(), ResolutionError>
    where
        L: DocumentLoader + ?Sized,
    {
        let child = match self.by_reference.get(&import.model) {
            Some(&idx) => idx,
            None => self.load(loader, importer, &import)?,
        };

        if self.on_stack[child] {
            let start = self
                .stack
                .iter()
                .position(|f| f.model == child)
                .unwrap_or(0);
            let mut path: Vec<String> = self.stack[start..]
                .iter()
                .map(|f| self.arena[f.model].name.clone())
                .collect();
            path.push(self.arena[child].name.clone());
            return Err(ResolutionError::CycleDetected { path });
        }

        self.edges.push((
            self.arena[importer].name.clone(),
            self.arena[child].name.clone(),
            ImportEdge::from(&import),
        ));

        if self.finished[child] {
            // already fully resolved through another path
            self.contribute(child, Some(&import));
            return Ok(());
        }

        if depth > options.max_depth {
            let mut chain = self.chain();
            chain.push(self.arena[child].name.clone());
            return Err(ResolutionError::DepthExceeded {
                limit: options.max_depth,
                chain,
            });
        }

        tracing::debug!(
            importer = %self.arena[importer].name,
            model = %self.arena[child].name,
            depth,
            "descending into import"
        );
        self.on_stack[child] = true;
        self.stack.push(Frame {
            model: child,
            via: Some(import),
            next: 0,
            depth,
        });
        Ok(())
    }

    fn load<L>(
        &mut self,
        loader: &L,
        importer: usize,
        import: &ImportDecl,
    ) -> Result<usize, ResolutionError>
    where
        L: DocumentLoader + ?Sized,
    {
        let importer_name = self.arena[importer].name.clone();
        let request = ImportRequest {
            import,
            importer: &importer_name,
            importer_origin: self.arena[importer].origin.as_deref(),
        };

        let document = match loader.load(&request) {
            Ok(document) => document,
            Err(LoadError::Parse { origin, message }) => {
                return Err(ResolutionError::StructuralError {
                    model: import.model.clone(),
                    issues: vec![Issue::new(
                        IssueCode::MalformedDocument,
                        "/",
                        format!("{}: {}", origin, message),
                    )],
                });
            }
            Err(err) => {
                let mut chain = self.chain();
                chain.push(request.reference().to_string());
                return Err(ResolutionError::ImportNotFound {
                    reference: request.reference().to_string(),
                    importer: importer_name,
                    chain,
                    reason: err.to_string(),
                });
            }
        };

        let mut warnings = Issues::new();
        let file = lift(&document, import.model.clone(), &mut warnings)?;
        let name = file.model.name.clone();

        for warning in warnings {
            self.issues.report(
                warning.code,
                format!("/models/{}{}", escape_segment(&name), warning.path),
                warning.message,
            );
        }

        if name != import.model {
            self.issues.report(
                IssueCode::ImportNameMismatch,
                format!("/models/{}/imports", escape_segment(&importer_name)),
                format!(
                    "import references '{}' but the loaded document declares model '{}'",
                    import.model, name
                ),
            );
        }

        // the same model reached under another reference
        let idx = match self.by_name.get(&name) {
            Some(&existing) => existing,
            None => self.push_model(name, document.origin().map(PathBuf::from), file),
        };
        self.by_reference.insert(import.model.clone(), idx);
        Ok(idx)
    }

    /// Queue a model's own declarations, shaped by the import that brought it in
    fn contribute(&mut self, model: usize, via: Option<&ImportDecl>) {
        let key: ContributionKey = (
            model,
            via.and_then(|v| v.alias.clone()),
            via.and_then(|v| v.entities.clone()),
        );
        if self.contribution_ids.contains_key(&key) {
            return;
        }
        let id = self.contribution_ids.len();
        self.contribution_ids.insert(key, id);

        let loaded = &self.arena[model];
        let file = &loaded.file;
        let admits = |entity: &str| via.map_or(true, |v| v.admits(entity));
        let admits_ref = |reference: &str| {
            via.and_then(|v| v.entities.as_ref()).is_none()
                || FieldRef::parse(reference).is_some_and(|r| admits(&r.entity))
        };

        if let Some(import) = via {
            if let Some(requested) = &import.entities {
                for (j, wanted) in requested.iter().enumerate() {
                    if !file.entities.iter().any(|e| &e.name == wanted) {
                        self.issues.report(
                            IssueCode::ImportEntityNotFound,
                            format!("/imports/{}/entities/{}", escape_segment(&import.model), j),
                            format!(
                                "import of '{}' requests entity '{}' which the model does not declare",
                                import.model, wanted
                            ),
                        );
                    }
                }
            }
        }

        // references to the file's own entities follow its alias
        let declared: HashSet<&str> = file.entities.iter().map(|e| e.name.as_str()).collect();
        let qualify_entity = |entity: &str| match via {
            Some(import) if declared.contains(entity) => import.qualify(entity),
            _ => entity.to_string(),
        };
        let qualify_ref = |reference: &str| match FieldRef::parse(reference) {
            Some(parsed) if declared.contains(parsed.entity.as_str()) => {
                format!("{}.{}", qualify_entity(&parsed.entity), parsed.field)
            }
            _ => reference.to_string(),
        };

        let entities = file
            .entities
            .iter()
            .filter(|e| admits(&e.name))
            .map(|e| {
                let mut entity = e.clone();
                entity.name = qualify_entity(&e.name);
                (e.name.clone(), entity)
            })
            .collect();

        let relationships = file
            .relationships
            .iter()
            .filter(|r| admits_ref(&r.from) && admits_ref(&r.to))
            .map(|r| Relationship {
                from: qualify_ref(&r.from),
                to: qualify_ref(&r.to),
                ..r.clone()
            })
            .collect();

        let filtered = via.and_then(|v| v.entities.as_ref()).is_some();
        let indexes = file
            .indexes
            .iter()
            .filter(|i| !filtered || admits(&i.entity))
            .map(|i| Index {
                entity: qualify_entity(&i.entity),
                ..i.clone()
            })
            .collect();

        let glossary = file
            .glossary
            .iter()
            .map(|t| GlossaryTerm {
                related_fields: t.related_fields.iter().map(|r| qualify_ref(r)).collect(),
                ..t.clone()
            })
            .collect();

        let governance = Governance {
            classification: file
                .governance
                .classification
                .iter()
                .filter(|(k, _)| admits_ref(k))
                .map(|(k, v)| (qualify_ref(k), v.clone()))
                .collect(),
            stewards: file
                .governance
                .stewards
                .iter()
                .map(|(k, v)| (qualify_ref(k), v.clone()))
                .collect(),
        };

        // a rule targets either a whole entity or one of its fields
        let rules = file
            .rules
            .iter()
            .filter(|r| {
                !filtered
                    || admits(&r.target)
                    || FieldRef::parse(&r.target).is_some_and(|t| admits(&t.entity))
            })
            .map(|r| Rule {
                target: if declared.contains(r.target.trim()) {
                    qualify_entity(r.target.trim())
                } else {
                    qualify_ref(&r.target)
                },
                ..r.clone()
            })
            .collect();

        let contribution = Contribution {
            id,
            model: loaded.name.clone(),
            alias: via.and_then(|v| v.alias.clone()),
            entities,
            relationships,
            indexes,
            glossary,
            governance,
            rules,
        };
        self.contributions.push(contribution);
    }

    fn finish(self) -> ResolvedGraph {
        let mut seen_edges: HashSet<(ModelName, ModelName)> = HashSet::new();
        let mut imports: HashMap<ModelName, Vec<ModelName>> = HashMap::new();
        for (from, to, _) in &self.edges {
            if seen_edges.insert((from.clone(), to.clone())) {
                imports.entry(from.clone()).or_default().push(to.clone());
            }
        }

        let models = self
            .arena
            .iter()
            .enumerate()
            .map(|(idx, loaded)| ModelInfo {
                name: loaded.name.clone(),
                origin: loaded.origin.clone(),
                imports: imports.remove(&loaded.name).unwrap_or_default(),
                entities: Vec::new(),
                is_root: idx == 0,
            })
            .collect();

        let meta = self.arena[0].file.model.clone();
        ResolvedGraph::fold(meta, models, self.edges, self.contributions, self.issues)
    }
}
