//! Provenance events
//!
//! One event is written per import run that changed something. It records
//! who ran the import, the log message and the time, and links to every
//! entity created or updated (its subjects) and to the versions written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

use super::PersistError;
use crate::models::{DataMap, DataValue, EntityType};
use crate::storage::GraphTransaction;

pub const HAS_EVENT_SUBJECT: &str = "hasEventSubject";
pub const HAS_ACTIONER: &str = "hasActioner";
pub const HAS_VERSION: &str = "hasVersion";

/// The user or process credited with a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Actor used when no user is given.
    pub fn system() -> Self {
        Self::new("system")
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::system()
    }
}

/// Kind of provenance event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Ingest,
    Creation,
    Modification,
    Deletion,
    Link,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Ingest => "ingest",
            EventType::Creation => "creation",
            EventType::Modification => "modification",
            EventType::Deletion => "deletion",
            EventType::Link => "link",
        };
        write!(f, "{}", s)
    }
}

/// Collects the subjects of one run before the event is written
#[derive(Debug, Clone)]
pub struct EventContext {
    actor: Actor,
    event_type: EventType,
    message: Option<String>,
    timestamp: DateTime<Utc>,
    subjects: Vec<String>,
    versions: Vec<String>,
}

impl EventContext {
    pub fn new(actor: Actor, event_type: EventType, message: Option<String>) -> Self {
        Self {
            actor,
            event_type,
            message,
            timestamp: Utc::now(),
            subjects: Vec::new(),
            versions: Vec::new(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Add a subject; repeated ids are kept once.
    pub fn add_subject(&mut self, id: &str) {
        if !self.subjects.iter().any(|s| s == id) {
            self.subjects.push(id.to_string());
        }
    }

    pub fn add_version(&mut self, id: &str) {
        self.versions.push(id.to_string());
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Write the event vertex and its edges, returning the event id.
    pub fn commit<T: GraphTransaction + ?Sized>(self, txn: &mut T) -> Result<String, PersistError> {
        let event_id = format!("event-{}", Uuid::new_v4());

        let mut properties = DataMap::new();
        properties.insert("eventType".to_string(), DataValue::from(self.event_type.to_string()));
        properties.insert("timestamp".to_string(), DataValue::from(self.timestamp.to_rfc3339()));
        properties.insert("actioner".to_string(), DataValue::from(self.actor.id.as_str()));
        if let Some(message) = &self.message {
            properties.insert("logMessage".to_string(), DataValue::from(message.as_str()));
        }
        txn.create_vertex(&event_id, EntityType::SystemEvent, properties)?;

        if txn.contains(&self.actor.id) {
            txn.add_edge(&event_id, HAS_ACTIONER, &self.actor.id, 0)?;
        }
        for (i, subject) in self.subjects.iter().enumerate() {
            txn.add_edge(&event_id, HAS_EVENT_SUBJECT, subject, i as u32)?;
        }
        for (i, version) in self.versions.iter().enumerate() {
            txn.add_edge(&event_id, HAS_VERSION, version, i as u32)?;
        }

        info!(
            event = %event_id,
            actor = %self.actor.id,
            subjects = self.subjects.len(),
            "Provenance event recorded"
        );
        Ok(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GraphRead, GraphStore, MemoryGraph};

    #[test]
    fn test_event_links_subjects_and_actor() {
        let mut graph = MemoryGraph::new();
        let mut txn = graph.begin().unwrap();
        txn.create_vertex("admin", EntityType::UserProfile, DataMap::new()).unwrap();
        txn.create_vertex("a", EntityType::Country, DataMap::new()).unwrap();
        txn.create_vertex("b", EntityType::Country, DataMap::new()).unwrap();

        let mut ctx = EventContext::new(
            Actor::new("admin"),
            EventType::Ingest,
            Some("Initial load".to_string()),
        );
        ctx.add_subject("a");
        ctx.add_subject("b");
        ctx.add_subject("a");
        assert_eq!(ctx.subjects().len(), 2);

        let event_id = ctx.commit(txn.as_mut()).unwrap();
        txn.commit().unwrap();

        assert_eq!(graph.out_edges(&event_id, HAS_EVENT_SUBJECT), vec!["a", "b"]);
        assert!(graph.has_edge(&event_id, HAS_ACTIONER, "admin"));
        let event = graph.vertex(&event_id).unwrap();
        assert_eq!(event.properties["logMessage"], DataValue::from("Initial load"));
        assert_eq!(event.properties["eventType"], DataValue::from("ingest"));
    }

    #[test]
    fn test_unknown_actor_is_recorded_as_property() {
        let mut graph = MemoryGraph::new();
        let mut txn = graph.begin().unwrap();
        let event_id = EventContext::new(Actor::system(), EventType::Ingest, None)
            .commit(txn.as_mut())
            .unwrap();
        txn.commit().unwrap();
        let event = graph.vertex(&event_id).unwrap();
        assert_eq!(event.properties["actioner"], DataValue::from("system"));
        assert!(graph.out_edges(&event_id, HAS_ACTIONER).is_empty());
    }
}
