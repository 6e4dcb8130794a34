//! Validation error tree mirroring a bundle

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Field errors for one bundle plus the error sets of its children
///
/// Children are keyed by relation label and position so every message can
/// be rendered with the path of the offending field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSet {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    relations: BTreeMap<String, BTreeMap<usize, ErrorSet>>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn with_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.add_error(field, message);
        self
    }

    /// Attach a child's errors; empty sets are discarded.
    pub fn add_relation(&mut self, label: impl Into<String>, index: usize, child: ErrorSet) {
        if child.is_empty() {
            return;
        }
        self.relations
            .entry(label.into())
            .or_default()
            .insert(index, child);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.relations.values().all(|m| m.values().all(Self::is_empty))
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn relation_errors(&self, label: &str, index: usize) -> Option<&ErrorSet> {
        self.relations.get(label).and_then(|m| m.get(&index))
    }

    /// Every message prefixed with its field path.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (field, messages) in &self.errors {
            for message in messages {
                out.push(format!("{}{}: {}", prefix, field, message));
            }
        }
        for (label, children) in &self.relations {
            for (index, child) in children {
                child.collect_paths(&format!("{}{}[{}].", prefix, label, index), out);
            }
        }
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.paths().join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_include_nested_positions() {
        let mut date_errors = ErrorSet::new();
        date_errors.add_error("startDate", "missing mandatory field");

        let mut desc_errors = ErrorSet::new();
        desc_errors.add_relation("hasDate", 1, date_errors);

        let mut root = ErrorSet::new().with_error("identifier", "missing mandatory field");
        root.add_relation("describes", 0, desc_errors);

        assert_eq!(
            root.paths(),
            vec![
                "identifier: missing mandatory field".to_string(),
                "describes[0].hasDate[1].startDate: missing mandatory field".to_string(),
            ]
        );
        assert!(!root.is_empty());
    }

    #[test]
    fn test_empty_children_are_dropped() {
        let mut root = ErrorSet::new();
        root.add_relation("describes", 0, ErrorSet::new());
        assert!(root.is_empty());
        assert!(root.relation_errors("describes", 0).is_none());
        assert_eq!(root.to_string(), "");
    }
}
