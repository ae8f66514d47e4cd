//! Error types for model resolution and compilation

use std::path::PathBuf;

use thiserror::Error;

use crate::issue::Issue;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Crate-wide errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("Invalid model format: {0}")]
    InvalidFormat(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Canonical model is not in canonical form: {0}")]
    NotCanonical(String),

    #[error("Model has {0} validation error(s); canonicalization refused")]
    Blocked(usize),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

/// Fatal failures of the resolver.
///
/// Non-fatal findings (duplicate entities across models, name mismatches)
/// are recorded as issues on the resolved graph instead.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Import cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// Full cycle, first and last element are the same model
        path: Vec<String>,
    },

    #[error("Import '{reference}' of model '{importer}' not found (import path: {}): {reason}", chain.join(" -> "))]
    ImportNotFound {
        reference: String,
        importer: String,
        chain: Vec<String>,
        reason: String,
    },

    #[error("Model '{model}' failed structural validation with {} error(s)", issues.iter().filter(|i| i.is_error()).count())]
    StructuralError { model: String, issues: Vec<Issue> },

    #[error("Import depth exceeded {limit} (import path: {})", chain.join(" -> "))]
    DepthExceeded { limit: usize, chain: Vec<String> },
}

impl ResolutionError {
    /// Issues carried by a structural failure, empty otherwise
    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::StructuralError { issues, .. } => issues,
            _ => &[],
        }
    }
}

/// Failures reported by a [`crate::loader::DocumentLoader`]
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no model document found for '{0}'")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },
}
