//! Graph storage abstraction
//!
//! Defines the narrow interface the import engine needs from a property
//! graph store, and two implementations:
//! - MemoryGraph: petgraph-backed store with clone-on-begin transactions
//! - FileGraphStore: MemoryGraph persisted as a JSON snapshot on commit

use serde::{Deserialize, Serialize};

use crate::models::{DataMap, Entity, EntityType};

pub mod filesystem;
pub mod memory;

pub use filesystem::FileGraphStore;
pub use memory::MemoryGraph;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Vertex not found: {0}")]
    VertexNotFound(String),
    #[error("Vertex already exists: {0}")]
    DuplicateVertex(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// A stored vertex: generated id, type tag and data properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(rename = "__id")]
    pub id: String,
    #[serde(rename = "__type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub properties: DataMap,
}

impl Vertex {
    /// View the vertex as a typed entity.
    pub fn to_entity(&self) -> Entity {
        Entity {
            id: self.id.clone(),
            entity_type: self.entity_type,
            data: self.properties.clone(),
        }
    }
}

/// Read access to a graph
pub trait GraphRead {
    /// Look up a vertex by generated id.
    fn vertex(&self, id: &str) -> Option<&Vertex>;

    /// Targets of `id`'s outgoing edges with `label`, in edge order.
    fn out_edges(&self, id: &str, label: &str) -> Vec<String>;

    /// Sources of edges with `label` pointing at `id`.
    fn in_edges(&self, id: &str, label: &str) -> Vec<String>;

    /// Ids of all vertices with the given type.
    fn vertices_of_type(&self, entity_type: EntityType) -> Vec<String>;

    fn vertex_count(&self) -> usize;

    fn contains(&self, id: &str) -> bool {
        self.vertex(id).is_some()
    }

    fn has_edge(&self, from: &str, label: &str, to: &str) -> bool {
        self.out_edges(from, label).iter().any(|t| t == to)
    }

    /// Frame a vertex as a typed entity.
    fn frame(&self, id: &str) -> Option<Entity> {
        self.vertex(id).map(Vertex::to_entity)
    }
}

/// A unit of work against the graph
///
/// All reads observe earlier writes of the same transaction. Nothing is
/// visible outside until [`GraphTransaction::commit`].
pub trait GraphTransaction: GraphRead {
    fn create_vertex(
        &mut self,
        id: &str,
        entity_type: EntityType,
        properties: DataMap,
    ) -> Result<(), StorageError>;

    /// Replace all data properties of a vertex.
    fn set_properties(&mut self, id: &str, properties: DataMap) -> Result<(), StorageError>;

    /// Remove a vertex and every edge touching it.
    fn remove_vertex(&mut self, id: &str) -> Result<(), StorageError>;

    /// Add an edge, or move an existing one to `ordinal`.
    fn add_edge(&mut self, from: &str, label: &str, to: &str, ordinal: u32)
    -> Result<(), StorageError>;

    /// Remove an edge; returns whether it existed.
    fn remove_edge(&mut self, from: &str, label: &str, to: &str) -> Result<bool, StorageError>;

    fn commit(self: Box<Self>) -> Result<(), StorageError>;

    fn rollback(self: Box<Self>);
}

/// A graph that can open transactions
pub trait GraphStore {
    fn begin(&mut self) -> Result<Box<dyn GraphTransaction + '_>, StorageError>;
}
