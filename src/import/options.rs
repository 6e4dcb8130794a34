//! Import run configuration
//!
//! Options can be built in code or loaded from a TOML file:
//!
//! ```toml
//! tolerant = true
//! allow_updates = false
//! default_language = "deu"
//! csv_delimiter = ";"
//! value_separator = "|"
//! properties = "mappings/ead.properties"
//! message = "Initial load"
//! parent_column = "parent"
//!
//! [hierarchy_map]
//! c1 = "p1"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::ImportError;

/// Settings for one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportOptions {
    /// Skip records that fail validation instead of aborting
    pub tolerant: bool,
    /// Permit changes to entities that already exist
    pub allow_updates: bool,
    /// Language code for descriptions that do not state one
    pub default_language: String,
    pub csv_delimiter: char,
    /// Separator of multiple values inside one table cell
    pub value_separator: char,
    /// Property mapping file for XML and table handlers
    pub properties: Option<PathBuf>,
    /// Log message stored on the provenance event
    pub message: Option<String>,
    /// Table column holding the local identifier of a row's parent
    pub parent_column: Option<String>,
    /// Child local identifier to parent local identifier, for tables
    pub hierarchy_map: BTreeMap<String, String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            tolerant: false,
            allow_updates: true,
            default_language: "eng".to_string(),
            csv_delimiter: ',',
            value_separator: ';',
            properties: None,
            message: None,
            parent_column: None,
            hierarchy_map: BTreeMap::new(),
        }
    }
}

impl ImportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tolerant(mut self, tolerant: bool) -> Self {
        self.tolerant = tolerant;
        self
    }

    pub fn allow_updates(mut self, allow: bool) -> Self {
        self.allow_updates = allow;
        self
    }

    pub fn default_language(mut self, code: impl Into<String>) -> Self {
        self.default_language = code.into();
        self
    }

    pub fn csv_delimiter(mut self, delimiter: char) -> Self {
        self.csv_delimiter = delimiter;
        self
    }

    pub fn value_separator(mut self, separator: char) -> Self {
        self.value_separator = separator;
        self
    }

    pub fn properties(mut self, path: impl Into<PathBuf>) -> Self {
        self.properties = Some(path.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn parent_column(mut self, column: impl Into<String>) -> Self {
        self.parent_column = Some(column.into());
        self
    }

    pub fn hierarchy_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.hierarchy_map = map;
        self
    }

    /// Whether table rows are nested under parent rows.
    pub fn is_hierarchical(&self) -> bool {
        self.parent_column.is_some() || !self.hierarchy_map.is_empty()
    }

    /// Parse options from TOML text; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ImportError> {
        let options: Self = toml::from_str(text).map_err(|e| ImportError::Config(e.to_string()))?;
        options.check()?;
        Ok(options)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ImportError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the handlers can not work with.
    pub fn check(&self) -> Result<(), ImportError> {
        if self.default_language.trim().is_empty() {
            return Err(ImportError::Config("default_language must not be empty".to_string()));
        }
        if !self.csv_delimiter.is_ascii() {
            return Err(ImportError::Config(format!(
                "csv_delimiter must be an ASCII character, got '{}'",
                self.csv_delimiter
            )));
        }
        if self.csv_delimiter == self.value_separator {
            return Err(ImportError::Config(
                "csv_delimiter and value_separator must differ".to_string(),
            ));
        }
        if let Some(column) = &self.parent_column
            && column.trim().is_empty()
        {
            return Err(ImportError::Config("parent_column must not be empty".to_string()));
        }
        if let Some((child, _)) = self.hierarchy_map.iter().find(|(child, parent)| child == parent) {
            return Err(ImportError::Config(format!(
                "hierarchy_map makes '{}' its own parent",
                child
            )));
        }
        Ok(())
    }
}
