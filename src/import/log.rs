//! Import run log
//!
//! An [`ImportLogBuilder`] accumulates outcomes while a run is in progress
//! and is owned by that run alone. [`ImportLogBuilder::build`] turns it
//! into the immutable [`ImportLog`] handed back to the caller.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Number of error messages kept per run; the count is never capped.
pub const MAX_ERROR_MESSAGES: usize = 100;

/// Accumulates the outcome of one import run
///
/// Each entity is counted once per run. A change outranks an earlier
/// unchanged outcome, and the first change sticks.
#[derive(Debug, Clone, Default)]
pub struct ImportLogBuilder {
    created_ids: Vec<String>,
    updated_ids: Vec<String>,
    changed: HashSet<String>,
    unchanged: HashSet<String>,
    error_count: usize,
    errors: BTreeMap<String, String>,
}

impl ImportLogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `id` is newly counted as changed.
    pub fn add_created(&mut self, id: &str) -> bool {
        if !self.mark_changed(id) {
            return false;
        }
        self.created_ids.push(id.to_string());
        true
    }

    pub fn add_updated(&mut self, id: &str) -> bool {
        if !self.mark_changed(id) {
            return false;
        }
        self.updated_ids.push(id.to_string());
        true
    }

    pub fn add_unchanged(&mut self, id: &str) -> bool {
        !self.changed.contains(id) && self.unchanged.insert(id.to_string())
    }

    fn mark_changed(&mut self, id: &str) -> bool {
        if !self.changed.insert(id.to_string()) {
            return false;
        }
        self.unchanged.remove(id);
        true
    }

    /// Count an error and keep its message while under the cap. Repeated
    /// locations get a `#n` suffix.
    pub fn add_error(&mut self, location: &str, message: impl Into<String>) {
        self.error_count += 1;
        if self.errors.len() >= MAX_ERROR_MESSAGES {
            return;
        }
        let mut key = location.to_string();
        let mut n = 1;
        while self.errors.contains_key(&key) {
            n += 1;
            key = format!("{} #{}", location, n);
        }
        self.errors.insert(key, message.into());
    }

    pub fn created(&self) -> usize {
        self.created_ids.len()
    }

    pub fn updated(&self) -> usize {
        self.updated_ids.len()
    }

    pub fn unchanged(&self) -> usize {
        self.unchanged.len()
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Whether `id` has been classified in this run, in any state.
    pub fn has_seen(&self, id: &str) -> bool {
        self.changed.contains(id) || self.unchanged.contains(id)
    }

    /// Whether the run created or updated anything.
    pub fn has_done_work(&self) -> bool {
        self.created() + self.updated() > 0
    }

    pub fn build(self, event_id: Option<String>, message: Option<String>) -> ImportLog {
        ImportLog {
            created: self.created_ids.len(),
            updated: self.updated_ids.len(),
            unchanged: self.unchanged.len(),
            error_count: self.error_count,
            created_ids: self.created_ids,
            updated_ids: self.updated_ids,
            errors: self.errors,
            event_id,
            message,
        }
    }
}

/// Summary of a finished import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLog {
    created: usize,
    updated: usize,
    unchanged: usize,
    error_count: usize,
    created_ids: Vec<String>,
    updated_ids: Vec<String>,
    /// Error messages keyed by record location
    errors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ImportLog {
    pub fn created(&self) -> usize {
        self.created
    }

    pub fn updated(&self) -> usize {
        self.updated
    }

    pub fn unchanged(&self) -> usize {
        self.unchanged
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn created_ids(&self) -> &[String] {
        &self.created_ids
    }

    pub fn updated_ids(&self) -> &[String] {
        &self.updated_ids
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn has_done_work(&self) -> bool {
        self.created + self.updated > 0
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Every entity the run created or updated.
    pub fn changed_ids(&self) -> impl Iterator<Item = &str> {
        self.created_ids
            .iter()
            .chain(self.updated_ids.iter())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_serialization() {
        let mut builder = ImportLogBuilder::new();
        builder.add_created("repoa-p1");
        builder.add_updated("repoa-p2");
        builder.add_unchanged("repoa-p3");
        builder.add_error("file.xml, record 4", "missing identifier");
        assert!(builder.has_done_work());

        let log = builder.build(Some("event-1".to_string()), Some("Initial".to_string()));
        assert_eq!((log.created(), log.updated(), log.unchanged()), (1, 1, 1));
        assert_eq!(log.changed_ids().collect::<Vec<_>>(), vec!["repoa-p1", "repoa-p2"]);

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["createdIds"][0], "repoa-p1");
        assert_eq!(json["errorCount"], 1);
        assert_eq!(json["errors"]["file.xml, record 4"], "missing identifier");
        assert_eq!(json["eventId"], "event-1");
    }

    #[test]
    fn test_entity_is_classified_once_per_run() {
        let mut builder = ImportLogBuilder::new();
        assert!(builder.add_created("repoa-p1"));
        assert!(!builder.add_updated("repoa-p1"));
        assert!(!builder.add_unchanged("repoa-p1"));
        assert!(builder.add_unchanged("repoa-p2"));
        assert!(!builder.add_unchanged("repoa-p2"));
        assert!(builder.add_updated("repoa-p2"));
        assert!(builder.add_unchanged("repoa-p3"));
        assert!(builder.has_seen("repoa-p2"));
        assert!(builder.has_seen("repoa-p3"));
        assert!(!builder.has_seen("repoa-p4"));
        let log = builder.build(None, None);
        assert_eq!(log.created_ids(), ["repoa-p1"]);
        assert_eq!(log.updated_ids(), ["repoa-p2"]);
        assert_eq!(log.unchanged(), 1);
    }

    #[test]
    fn test_errors_at_one_location_are_all_kept() {
        let mut builder = ImportLogBuilder::new();
        builder.add_error("units.csv, record 2", "bad level");
        builder.add_error("units.csv, record 2", "bad date");
        let log = builder.build(None, None);
        assert_eq!(log.error_count(), 2);
        assert_eq!(log.errors()["units.csv, record 2"], "bad level");
        assert_eq!(log.errors()["units.csv, record 2 #2"], "bad date");
    }

    #[test]
    fn test_error_messages_are_capped_but_counted() {
        let mut builder = ImportLogBuilder::new();
        for i in 0..150 {
            builder.add_error(&format!("f, record {}", i), "bad");
        }
        let log = builder.build(None, None);
        assert_eq!(log.error_count(), 150);
        assert_eq!(log.errors().len(), MAX_ERROR_MESSAGES);
        assert!(!log.has_done_work());
        assert!(log.event_id().is_none());
    }
}
