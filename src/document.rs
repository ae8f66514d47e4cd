//! Model documents
//!
//! A [`ModelDocument`] is one parsed model file before any validation: the
//! raw tree plus where it came from. Text parsing is a thin convenience over
//! serde; the core only ever looks at the tree.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{LoadError, ModelError, Result};
use crate::model::ModelFile;

/// One parsed model document
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDocument {
    content: Value,
    origin: Option<PathBuf>,
}

impl ModelDocument {
    pub fn new(content: Value) -> Self {
        Self {
            content,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(Self::new(toml::from_str::<Value>(text)?))
    }

    /// Read a document from disk, choosing the parser by extension
    pub fn from_path(path: &Path) -> std::result::Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        };

        parsed
            .map(|doc| doc.with_origin(path))
            .map_err(|e| LoadError::Parse {
                origin: path.display().to_string(),
                message: e.to_string(),
            })
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// `model.name` if present, without typing the document
    pub fn name(&self) -> Option<&str> {
        self.content.get("model")?.get("name")?.as_str()
    }

    /// Lift the tree into the typed model.
    ///
    /// Callers run the structural validator first; this only fails for
    /// shapes the validator cannot express.
    pub fn to_model(&self) -> Result<ModelFile> {
        serde_json::from_value(self.content.clone()).map_err(|e| {
            ModelError::InvalidFormat(format!(
                "{}: {}",
                self.display_name(),
                e
            ))
        })
    }

    /// Name used in messages: model name, then origin, then a placeholder
    pub fn display_name(&self) -> String {
        self.name()
            .map(String::from)
            .or_else(|| self.origin.as_ref().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "<anonymous>".to_string())
    }
}

impl From<Value> for ModelDocument {
    fn from(content: Value) -> Self {
        Self::new(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_and_toml_parse_to_same_tree() {
        let json = ModelDocument::from_json_str(
            r#"{"model": {"name": "crm", "version": "1.0.0", "domain": "sales", "owners": ["a"], "state": "draft"}}"#,
        )
        .unwrap();
        let toml = ModelDocument::from_toml_str(
            r#"
[model]
name = "crm"
version = "1.0.0"
domain = "sales"
owners = ["a"]
state = "draft"
"#,
        )
        .unwrap();

        assert_eq!(json.content(), toml.content());
        assert_eq!(json.name(), Some("crm"));
    }

    #[test]
    fn test_display_name_falls_back_to_origin() {
        let doc = ModelDocument::new(serde_json::json!({})).with_origin("models/x.model.json");
        assert_eq!(doc.display_name(), "models/x.model.json");
    }
}
