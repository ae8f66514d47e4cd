//! Configuration for the datalex tooling
//!
//! Sources, later ones overriding earlier ones:
//! - built-in defaults
//! - `datalex.toml`, `.datalex.toml`, `config/datalex.toml` in the working directory
//! - `datalex.toml` in the user config directory
//! - an explicit file passed by the caller
//! - environment variables `DATALEX__<SECTION>__<KEY>`
//!
//! ## Example (datalex.toml):
//! ```toml
//! [resolver]
//! search_dirs = ["models/shared"]
//! max_depth = 16
//!
//! [diff]
//! widening_safe = [["integer", "bigint"], ["varchar", "string"]]
//! fail_on_breaking = true
//!
//! [validation]
//! warnings_as_errors = false
//!
//! [output]
//! format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compatibility::{CompatibilityChecker, WideningPolicy};
use crate::error::{ModelError, Result};
use crate::graph::ResolveOptions;
use crate::loader::FileSystemLoader;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatalexConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub diff: DiffConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Extra directories searched for imported models
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Groups of field types that may replace one another
    #[serde(default)]
    pub widening_safe: Vec<Vec<String>>,

    #[serde(default = "default_true")]
    pub fail_on_breaking: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub warnings_as_errors: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// JSON output style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

fn default_max_depth() -> usize {
    ResolveOptions::default().max_depth
}

fn default_true() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            max_depth: default_max_depth(),
        }
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            widening_safe: Vec::new(),
            fail_on_breaking: true,
        }
    }
}

impl DatalexConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering `config_path` over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        for location in ["datalex.toml", ".datalex.toml", "config/datalex.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "datalex", "datalex") {
            let user_config = dirs.config_dir().join("datalex.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("DATALEX")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("resolver.search_dirs"),
        );

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;
        tracing::debug!(?loaded, "configuration loaded");
        Ok(loaded)
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ModelError::Config(ConfigError::Message(format!("cannot serialize config: {}", e)))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            max_depth: self.resolver.max_depth,
        }
    }

    pub fn loader(&self) -> FileSystemLoader {
        FileSystemLoader::with_search_dirs(self.resolver.search_dirs.iter().cloned())
    }

    pub fn widening_policy(&self) -> WideningPolicy {
        WideningPolicy::from_groups(&self.diff.widening_safe)
    }

    pub fn checker(&self) -> CompatibilityChecker {
        CompatibilityChecker::new().with_widening(self.widening_policy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldType;

    #[test]
    fn test_default_config() {
        let config = DatalexConfig::default();
        assert_eq!(config.resolver.max_depth, 32);
        assert!(config.diff.fail_on_breaking);
        assert!(!config.validation.warnings_as_errors);
        assert!(config.widening_policy().is_empty());
    }

    #[test]
    fn test_serialize_config() {
        let toml_str = toml::to_string_pretty(&DatalexConfig::default()).unwrap();
        assert!(toml_str.contains("[resolver]"));
        assert!(toml_str.contains("[diff]"));
    }

    #[test]
    fn test_load_explicit_file_and_save() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[resolver]
search_dirs = ["shared"]
max_depth = 4

[diff]
widening_safe = [["int", "bigint"]]
"#,
        )
        .unwrap();

        let config = DatalexConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.resolver.max_depth, 4);
        assert_eq!(config.resolver.search_dirs, vec![PathBuf::from("shared")]);
        assert!(config
            .widening_policy()
            .is_safe(&FieldType::parse("integer"), &FieldType::parse("bigint")));

        let saved = tmp.path().join("saved.toml");
        config.save(&saved).unwrap();
        assert_eq!(DatalexConfig::load_from(Some(&saved)).unwrap(), config);
    }
}
