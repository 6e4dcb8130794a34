//! Persistence of bundles into the graph
//!
//! - [`BundleDao`]: diff-based create/update of bundle trees
//! - [`Scope`]: ownership scopes and their id paths
//! - [`EventContext`]: provenance events for a unit of work

pub mod dao;
pub mod events;
pub mod scope;

pub use dao::BundleDao;
pub use events::{Actor, EventContext, EventType};
pub use scope::Scope;

use crate::convert::ConvertError;
use crate::identifier::IdError;
use crate::storage::StorageError;
use crate::validation::ValidationError;

/// Errors raised while persisting bundles
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Bundle data failed schema rules
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Id collision across types, or an unresolvable cross reference
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Referenced scope or entity is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Updates were requested to be refused
    #[error("Update not allowed: {0}")]
    UpdateNotAllowed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PersistError {
    /// Whether tolerant runs may skip the failing record and carry on.
    ///
    /// Only validation and missing-entity failures are local to a record;
    /// integrity and storage failures always abort.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PersistError::Validation(_) | PersistError::NotFound(_))
    }
}

impl From<ConvertError> for PersistError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::NotFound(id) => PersistError::NotFound(id),
            other => PersistError::Serialization(other.to_string()),
        }
    }
}

impl From<IdError> for PersistError {
    fn from(err: IdError) -> Self {
        PersistError::Integrity(err.to_string())
    }
}
