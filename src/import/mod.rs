//! Import functionality
//!
//! Format handlers turn an input stream into bundles; importers persist
//! those bundles under a scope; the [`ImportManager`] runs both inside one
//! transaction and produces an [`ImportLog`]. A sync run additionally
//! removes the units a re-imported finding aid no longer contains.
//!
//! Handlers:
//! - EAD finding aids ([`EadHandler`])
//! - EAC-CPF authority records ([`EacHandler`])
//! - SKOS vocabularies ([`SkosHandler`])
//! - delimited tables ([`CsvHandler`])
//! - JSON-lines bundles ([`JsonLinesHandler`])

pub mod eac;
pub mod ead;
pub mod importers;
pub mod jsonl;
pub mod log;
pub mod manager;
pub mod options;
pub mod properties;
pub mod shape;
pub mod skos;
pub mod sync;
pub mod tabular;
pub mod xml;

use std::io::BufRead;
use tracing::{debug, warn};

use crate::models::{Bundle, Entity, Mutation, MutationState};
use crate::persistence::{Actor, BundleDao, EventContext, PersistError, Scope};
use crate::storage::{GraphTransaction, StorageError};
use crate::validation::ValidationError;

pub use eac::EacHandler;
pub use ead::EadHandler;
pub use importers::{AuthorityImporter, BundleImporter, ConceptImporter, UnitImporter};
pub use jsonl::JsonLinesHandler;
pub use log::{ImportLog, ImportLogBuilder};
pub use manager::{ImportCallback, ImportManager, RunState};
pub use options::ImportOptions;
pub use properties::PropertyMap;
pub use skos::SkosHandler;
pub use sync::SyncLog;
pub use tabular::CsvHandler;

/// Relation carrying nested hierarchical records from a handler to its
/// importer. It is never persisted as such.
pub const CHILD_ITEM: &str = "childItem";

/// Error during import
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An existing entity would change while updates are disallowed
    #[error("Update not allowed: {0}")]
    ModeViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure of one record, with its location in the input
    #[error("{location}: {source}")]
    Record {
        location: String,
        #[source]
        source: Box<ImportError>,
    },
}

impl ImportError {
    /// Whether a tolerant run may record this failure and continue.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ImportError::Validation(_) | ImportError::NotFound(_) => true,
            ImportError::Record { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Short message suitable for end users.
    pub fn user_message(&self) -> String {
        match self {
            ImportError::Parse(msg) => format!("The input could not be read: {}", msg),
            ImportError::Validation(e) => format!("Invalid record: {}", e.errors),
            ImportError::Integrity(msg) => format!("Conflicting data: {}", msg),
            ImportError::NotFound(what) => format!("Could not find {}", what),
            ImportError::ModeViolation(id) => {
                format!("'{}' already exists and updates are not allowed", id)
            }
            ImportError::Storage(e) => format!("The graph store failed: {}", e),
            ImportError::Io(e) => format!("File error: {}", e),
            ImportError::Csv(e) => format!("The table could not be read: {}", e),
            ImportError::Config(msg) => format!("Bad configuration: {}", msg),
            ImportError::Record { location, source } => {
                format!("{}: {}", location, source.user_message())
            }
        }
    }

    pub(crate) fn at(self, location: impl Into<String>) -> Self {
        match self {
            ImportError::Record { .. } => self,
            other => ImportError::Record {
                location: location.into(),
                source: Box::new(other),
            },
        }
    }
}

impl From<PersistError> for ImportError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Validation(e) => ImportError::Validation(e),
            PersistError::Integrity(msg) => ImportError::Integrity(msg),
            PersistError::NotFound(what) => ImportError::NotFound(what),
            PersistError::UpdateNotAllowed(id) => ImportError::ModeViolation(id),
            PersistError::Storage(e) => ImportError::Storage(e),
            PersistError::Serialization(msg) => {
                ImportError::Storage(StorageError::SerializationError(msg))
            }
        }
    }
}

/// One finished record emitted by a handler
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    pub bundle: Bundle,
    /// 1-based record number within the current input
    pub position: usize,
}

/// Receives finished records as a handler emits them
pub trait ItemSink {
    fn accept(&mut self, item: ImportItem) -> Result<(), ImportError>;
}

impl ItemSink for Vec<ImportItem> {
    fn accept(&mut self, item: ImportItem) -> Result<(), ImportError> {
        self.push(item);
        Ok(())
    }
}

/// Parses one input format into bundles. Handlers never touch the graph.
pub trait StreamHandler {
    /// Format name used in logs.
    fn name(&self) -> &'static str;

    /// Read `input` to the end, handing each finished record to `sink`.
    /// Returns the number of records emitted.
    fn stream(&mut self, input: &mut dyn BufRead, sink: &mut dyn ItemSink) -> Result<usize, ImportError>;
}

/// Persists the records of one entity family
pub trait Importer {
    fn import_item(&mut self, ctx: &mut ImportContext<'_>, item: ImportItem) -> Result<(), ImportError>;

    /// Called once after every input has been streamed.
    fn finish(&mut self, _ctx: &mut ImportContext<'_>) -> Result<(), ImportError> {
        Ok(())
    }
}

/// Per-run state shared by the manager and its importer
pub struct ImportContext<'a> {
    txn: &'a mut dyn GraphTransaction,
    dao: BundleDao,
    scope: Scope,
    state: RunState,
    tolerant: bool,
    source: String,
    position: usize,
    log: ImportLogBuilder,
    event: EventContext,
    callbacks: &'a mut [Box<dyn ImportCallback>],
}

impl<'a> ImportContext<'a> {
    pub fn new(
        txn: &'a mut dyn GraphTransaction,
        dao: BundleDao,
        event: EventContext,
        tolerant: bool,
        callbacks: &'a mut [Box<dyn ImportCallback>],
    ) -> Self {
        Self {
            txn,
            dao,
            scope: Scope::system(),
            state: RunState::OpenTransaction,
            tolerant,
            source: String::new(),
            position: 0,
            log: ImportLogBuilder::new(),
            event,
            callbacks,
        }
    }

    pub fn txn(&mut self) -> &mut dyn GraphTransaction {
        &mut *self.txn
    }

    pub fn graph(&self) -> &dyn GraphTransaction {
        &*self.txn
    }

    /// Scope the run imports into.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: RunState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Import state");
            self.state = next;
        }
    }

    pub fn actor(&self) -> &Actor {
        self.event.actor()
    }

    pub fn is_tolerant(&self) -> bool {
        self.tolerant
    }

    pub fn log(&self) -> &ImportLogBuilder {
        &self.log
    }

    pub(crate) fn set_source(&mut self, source: &str) {
        self.source = source.to_string();
        self.position = 0;
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Location of the record being imported: `<source>, record <n>`.
    pub fn location(&self) -> String {
        format!("{}, record {}", self.source, self.position)
    }

    /// Persist a bundle and account for the outcome.
    pub fn persist(&mut self, bundle: &Bundle, scope: &Scope) -> Result<Mutation<Entity>, ImportError> {
        let actor = self.event.actor().clone();
        let mutation = self.dao.persist(&mut *self.txn, bundle, scope, &actor)?;
        self.record(&mutation);
        Ok(mutation)
    }

    /// Add a cross-reference edge unless it already exists.
    pub fn link(&mut self, from: &str, label: &str, to: &str) -> Result<bool, ImportError> {
        Ok(self.dao.link(&mut *self.txn, from, label, to)?)
    }

    fn record(&mut self, mutation: &Mutation<Entity>) {
        let id = mutation.node().id.as_str();
        match mutation.state() {
            MutationState::Created => {
                if self.log.add_created(id) {
                    self.event.add_subject(id);
                }
            }
            MutationState::Updated => {
                if self.log.add_updated(id) {
                    self.event.add_subject(id);
                }
                if let Some(version) = mutation.version_id() {
                    self.event.add_version(version);
                }
            }
            MutationState::Unchanged => {
                self.log.add_unchanged(id);
            }
        }
        for callback in self.callbacks.iter_mut() {
            callback.item_processed(mutation);
        }
    }

    /// Apply the run's tolerance to the outcome of one record.
    ///
    /// In tolerant mode recoverable failures are logged against `location`
    /// and turned into `None`; anything else is returned as a record error.
    pub fn tolerate<T>(&mut self, location: &str, result: Result<T, ImportError>) -> Result<Option<T>, ImportError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.tolerant && err.is_recoverable() => {
                warn!(location, error = %err, "Skipping record");
                self.log.add_error(location, err.to_string());
                Ok(None)
            }
            Err(err) => Err(err.at(location)),
        }
    }

    /// Write the provenance event if the run changed anything and seal
    /// the log.
    pub(crate) fn finish_run(mut self, message: Option<String>) -> Result<ImportLog, ImportError> {
        self.transition(RunState::AttachProvenance);
        let event_id = if self.log.has_done_work() {
            Some(self.event.commit(&mut *self.txn)?)
        } else {
            debug!("Nothing changed, no provenance event written");
            None
        };
        Ok(self.log.build(event_id, message))
    }
}

impl std::fmt::Debug for ImportContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportContext")
            .field("source", &self.source)
            .field("position", &self.position)
            .field("tolerant", &self.tolerant)
            .finish()
    }
}
