//! Archival Import SDK - import and reconciliation engine for archival
//! descriptions stored in a versioned property graph
//!
//! Provides:
//! - Deterministic hierarchical identifiers ([`identifier`])
//! - Bundles, the tree-shaped staging form of an entity ([`models`])
//! - Schema validation ([`validation`])
//! - Diff-based create/update of bundle trees with provenance ([`persistence`])
//! - Streaming format handlers and the import run manager ([`import`])
//! - Graph store abstraction with in-memory and file-backed stores ([`storage`])

pub mod convert;
pub mod identifier;
pub mod import;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod storage;
pub mod validation;

// Re-export commonly used types
pub use identifier::{IdError, generate, normalize};
pub use import::{
    AuthorityImporter, BundleImporter, ConceptImporter, CsvHandler, EacHandler, EadHandler,
    ImportCallback, ImportError, ImportLog, ImportManager, ImportOptions, JsonLinesHandler,
    PropertyMap, RunState, SkosHandler, SyncLog, UnitImporter,
};
pub use models::{Bundle, DataValue, Entity, EntityType, ErrorSet, Mutation, MutationState};
pub use persistence::{Actor, BundleDao, EventContext, EventType, PersistError, Scope};
pub use storage::{
    FileGraphStore, GraphRead, GraphStore, GraphTransaction, MemoryGraph, StorageError,
};
pub use validation::ValidationError;
