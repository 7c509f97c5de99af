use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Nesting depth after which validation gives up with `SchemaError::RecursionLimit`.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Options shared by validation and transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Accept object keys that no class property declares. Transformation
    /// drops such keys either way.
    pub allow_unknown_fields: bool,
    pub max_depth: usize,
    /// Treat a class without a registered factory as a schema error instead of
    /// building a plain object.
    pub strict_factories: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allow_unknown_fields: false,
            max_depth: DEFAULT_MAX_DEPTH,
            strict_factories: false,
        }
    }
}

impl Options {
    /// # Errors
    /// Returns `ConfigError::Yaml` if the document does not describe `Options`.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// # Errors
    /// Returns `ConfigError::Json` if the document does not describe `Options`.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Loads options from a `.yaml`, `.yml` or `.json` file.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the file cannot be read, has an unsupported
    /// extension or does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let source = std::fs::read_to_string(path)?;
        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&source),
            "json" => Self::from_json_str(&source),
            _ => Err(ConfigError::UnsupportedFormat { extension }),
        }
    }

    #[must_use]
    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.allow_unknown_fields = allow;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    #[must_use]
    pub fn strict_factories(mut self, strict: bool) -> Self {
        self.strict_factories = strict;
        self
    }
}
