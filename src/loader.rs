//! Document loading
//!
//! The resolver never touches the filesystem itself; it asks a
//! [`DocumentLoader`] for every import. This module holds that seam plus the
//! loaders the CLI and tests use.
//!
//! File lookup for an import without an explicit `path`:
//! 1. `<model>.model.json` / `<model>.model.toml` next to the importing file
//! 2. the same names in each configured search directory
//! 3. one level of non-hidden subdirectories of those directories, sorted

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::document::ModelDocument;
use crate::error::{LoadError, ModelError};
use crate::graph::{ResolveOptions, ResolvedGraph, Resolver};
use crate::model::ImportDecl;

/// Recognized model file suffixes, in lookup order
pub const MODEL_SUFFIXES: &[&str] = &[".model.json", ".model.toml"];

/// What the resolver asks a loader for
#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'a> {
    pub import: &'a ImportDecl,
    /// Name of the importing model
    pub importer: &'a str,
    /// Where the importing document was read from, if anywhere
    pub importer_origin: Option<&'a Path>,
}

impl ImportRequest<'_> {
    /// Reference as written: the path if given, else the model name
    pub fn reference(&self) -> &str {
        self.import.path.as_deref().unwrap_or(&self.import.model)
    }
}

/// Supplies documents for import declarations
pub trait DocumentLoader {
    fn load(&self, request: &ImportRequest<'_>) -> Result<ModelDocument, LoadError>;
}

impl<F> DocumentLoader for F
where
    F: Fn(&ImportRequest<'_>) -> Result<ModelDocument, LoadError>,
{
    fn load(&self, request: &ImportRequest<'_>) -> Result<ModelDocument, LoadError> {
        self(request)
    }
}

/// Loader for documents without imports; every request is `NotFound`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl DocumentLoader for NoImports {
    fn load(&self, request: &ImportRequest<'_>) -> Result<ModelDocument, LoadError> {
        Err(LoadError::NotFound(request.reference().to_string()))
    }
}

/// In-memory loader keyed by model name (or import path)
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: BTreeMap<String, ModelDocument>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, document: ModelDocument) {
        self.documents.insert(key.into(), document);
    }

    pub fn with(mut self, key: impl Into<String>, document: impl Into<ModelDocument>) -> Self {
        self.insert(key, document.into());
        self
    }
}

impl DocumentLoader for MemoryLoader {
    fn load(&self, request: &ImportRequest<'_>) -> Result<ModelDocument, LoadError> {
        request
            .import
            .path
            .as_ref()
            .and_then(|p| self.documents.get(p))
            .or_else(|| self.documents.get(&request.import.model))
            .cloned()
            .ok_or_else(|| LoadError::NotFound(request.reference().to_string()))
    }
}

/// Loader reading `*.model.json` / `*.model.toml` files from disk
#[derive(Debug, Clone, Default)]
pub struct FileSystemLoader {
    search_dirs: Vec<PathBuf>,
}

impl FileSystemLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_dirs(search_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_dirs: search_dirs.into_iter().collect(),
        }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Find the file an import refers to
    pub fn locate(&self, request: &ImportRequest<'_>) -> Option<PathBuf> {
        let base_dir = request
            .importer_origin
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if let Some(relative) = &request.import.path {
            let candidate = base_dir.join(relative);
            return candidate.is_file().then_some(candidate);
        }

        let dirs = std::iter::once(base_dir).chain(self.search_dirs.iter().cloned());
        let dirs: Vec<PathBuf> = dirs.collect();

        for dir in &dirs {
            if let Some(found) = find_in_dir(dir, &request.import.model) {
                return Some(found);
            }
        }

        for dir in &dirs {
            for sub in visible_subdirs(dir) {
                if let Some(found) = find_in_dir(&sub, &request.import.model) {
                    return Some(found);
                }
            }
        }

        None
    }
}

impl DocumentLoader for FileSystemLoader {
    fn load(&self, request: &ImportRequest<'_>) -> Result<ModelDocument, LoadError> {
        let path = self
            .locate(request)
            .ok_or_else(|| LoadError::NotFound(request.reference().to_string()))?;
        tracing::debug!(path = %path.display(), model = %request.import.model, "loading import");
        ModelDocument::from_path(&path)
    }
}

fn find_in_dir(dir: &Path, model: &str) -> Option<PathBuf> {
    MODEL_SUFFIXES
        .iter()
        .map(|suffix| dir.join(format!("{}{}", model, suffix)))
        .find(|candidate| candidate.is_file())
}

fn visible_subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut subdirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && !is_hidden(path))
        .collect();
    subdirs.sort();
    subdirs
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Whether a path names a model file
pub fn is_model_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| MODEL_SUFFIXES.iter().any(|s| n.ends_with(s)))
}

/// All model files under `dir`, sorted, skipping hidden directories
pub fn discover_models(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_model_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Outcome of resolving one model file of a project
#[derive(Debug)]
pub struct ProjectEntry {
    pub file: PathBuf,
    pub outcome: Result<ResolvedGraph, ModelError>,
}

/// Resolve every model file under `dir` as a root.
///
/// The project directory is searched for imports after each file's own
/// directory and before the loader's other search directories.
pub fn resolve_project(
    dir: &Path,
    loader: &FileSystemLoader,
    options: &ResolveOptions,
) -> Vec<ProjectEntry> {
    let mut search_dirs = vec![dir.to_path_buf()];
    search_dirs.extend(loader.search_dirs().iter().cloned());
    let loader = FileSystemLoader::with_search_dirs(search_dirs);

    discover_models(dir)
        .into_iter()
        .map(|file| {
            let outcome = ModelDocument::from_path(&file)
                .map_err(ModelError::from)
                .and_then(|doc| {
                    Resolver::new(&loader)
                        .with_options(options.clone())
                        .resolve(&doc)
                        .map_err(ModelError::from)
                });
            ProjectEntry { file, outcome }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, body: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_locate_prefers_importer_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let root = write(tmp.path(), "root.model.json", "{}");
        let sibling = write(tmp.path(), "shared.model.json", "{}");
        write(tmp.path(), "lib/shared.model.json", "{}");

        let loader = FileSystemLoader::with_search_dirs([tmp.path().join("lib")]);
        let import = ImportDecl::new("shared");
        let request = ImportRequest {
            import: &import,
            importer: "root",
            importer_origin: Some(&root),
        };

        assert_eq!(loader.locate(&request), Some(sibling));
    }

    #[test]
    fn test_locate_searches_one_level_of_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = write(tmp.path(), "root.model.json", "{}");
        write(tmp.path(), ".hidden/dims.model.toml", "");
        let nested = write(tmp.path(), "shared/dims.model.toml", "");

        let import = ImportDecl::new("dims");
        let request = ImportRequest {
            import: &import,
            importer: "root",
            importer_origin: Some(&root),
        };

        assert_eq!(FileSystemLoader::new().locate(&request), Some(nested));
    }

    #[test]
    fn test_explicit_path_is_relative_to_importer() {
        let tmp = tempfile::tempdir().unwrap();
        let root = write(tmp.path(), "domains/sales/root.model.json", "{}");
        let target = write(tmp.path(), "domains/shared/dims.model.json", "{}");

        let mut import = ImportDecl::new("dims");
        import.path = Some("../shared/dims.model.json".to_string());
        let request = ImportRequest {
            import: &import,
            importer: "root",
            importer_origin: Some(&root),
        };

        let found = FileSystemLoader::new().locate(&request).unwrap();
        assert_eq!(fs::canonicalize(found).unwrap(), fs::canonicalize(target).unwrap());
    }

    #[test]
    fn test_missing_import_is_not_found() {
        let import = ImportDecl::new("nowhere");
        let request = ImportRequest {
            import: &import,
            importer: "root",
            importer_origin: None,
        };
        let err = NoImports.load(&request).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(ref r) if r == "nowhere"));
    }

    #[test]
    fn test_discover_models_is_sorted_and_skips_hidden() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "b.model.json", "{}");
        write(tmp.path(), "a/z.model.toml", "");
        write(tmp.path(), ".cache/c.model.json", "{}");
        write(tmp.path(), "notes.json", "{}");

        let found: Vec<String> = discover_models(tmp.path())
            .into_iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().display().to_string())
            .collect();

        assert_eq!(found, vec!["a/z.model.toml", "b.model.json"]);
    }
}
