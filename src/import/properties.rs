//! Property mapping tables
//!
//! A mapping is a flat list of `key=field` lines, loaded once per importer
//! configuration. Blank lines and lines starting with `#` are skipped.
//!
//! For XML handlers a key is an element path suffix ending in `/`: for the
//! path `did/unitid` the keys `unitid/` and `did/unitid/` are tried and the
//! longest one present wins. Attribute keys append `@name` to a path suffix
//! (`@level` alone matches the record element itself). Text inside an
//! element with no mapping belongs to its nearest mapped ancestor. An
//! empty field name drops the content.
//!
//! For tables a key is a column header.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::error;

use super::ImportError;
use crate::models::entity_type::UNKNOWN_PREFIX;

const EAD_DEFAULTS: &str = include_str!("mappings/ead.properties");
const EAC_DEFAULTS: &str = include_str!("mappings/eac.properties");

/// Outcome of looking up an element path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMapping<'a> {
    /// Store under this field
    Field(&'a str),
    /// Mapped to nothing
    Ignored,
    /// No key matched the path or any of its ancestors
    Unknown(String),
}

/// Flat key to field-name table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    entries: BTreeMap<String, String>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=field` lines.
    pub fn parse(text: &str) -> Result<Self, ImportError> {
        let mut entries = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                ImportError::Config(format!("mapping line {} has no '=': {}", number + 1, line))
            })?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { entries })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ImportError::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Default mapping for EAD finding aids.
    pub fn ead() -> Self {
        Self::bundled("ead", EAD_DEFAULTS)
    }

    /// Default mapping for EAC-CPF records.
    pub fn eac() -> Self {
        Self::bundled("eac", EAC_DEFAULTS)
    }

    fn bundled(name: &str, text: &str) -> Self {
        match Self::parse(text) {
            Ok(map) => map,
            Err(e) => {
                error!(mapping = name, error = %e, "Bundled property mapping is broken");
                Self::default()
            }
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, field: impl Into<String>) -> Self {
        self.entries.insert(key.into(), field.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field for the text of the element at `path`.
    pub fn lookup_path<S: AsRef<str>>(&self, path: &[S]) -> PathMapping<'_> {
        for end in (1..=path.len()).rev() {
            if let Some(field) = self.match_suffix(&path[..end], "") {
                return field;
            }
        }
        PathMapping::Unknown(unknown_key(path))
    }

    /// Field for attribute `name` of the element at `path`, if mapped.
    pub fn lookup_attribute<S: AsRef<str>>(&self, path: &[S], name: &str) -> Option<PathMapping<'_>> {
        let attribute = format!("@{}", name);
        match self.match_suffix(path, &attribute) {
            Some(found) => Some(found),
            None if path.is_empty() => self.get(&attribute).map(mapping),
            None => None,
        }
    }

    /// Field for a table column; unmapped columns keep their header with
    /// whitespace removed.
    pub fn column<'a>(&'a self, header: &'a str) -> PathMapping<'a> {
        match self.get(header.trim()) {
            Some(field) => mapping(field),
            None => {
                let compact: String = header.chars().filter(|c| !c.is_whitespace()).collect();
                if compact.is_empty() {
                    PathMapping::Ignored
                } else {
                    PathMapping::Unknown(compact)
                }
            }
        }
    }

    fn match_suffix<S: AsRef<str>>(&self, path: &[S], attribute: &str) -> Option<PathMapping<'_>> {
        let mut key = String::new();
        let mut found = None;
        for segment in path.iter().rev() {
            key = format!("{}/{}", segment.as_ref(), key);
            if let Some(field) = self.get(&format!("{}{}", key, attribute)) {
                found = Some(mapping(field));
            }
        }
        found
    }
}

fn mapping(field: &str) -> PathMapping<'_> {
    if field.is_empty() {
        PathMapping::Ignored
    } else {
        PathMapping::Field(field)
    }
}

/// `UNKNOWN_` key for an unmapped path: `did/abstract` gives
/// `UNKNOWN_did_abstract`.
pub fn unknown_key<S: AsRef<str>>(path: &[S]) -> String {
    let joined: Vec<&str> = path.iter().map(AsRef::as_ref).collect();
    format!("{}{}", UNKNOWN_PREFIX, joined.join("_"))
}
