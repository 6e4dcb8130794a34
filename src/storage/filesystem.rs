//! File-backed graph store
//!
//! Wraps a [`MemoryGraph`] and writes the whole graph to a JSON snapshot
//! every time a transaction commits. The snapshot is written to a sibling
//! temporary file first and renamed over the target, so a crash mid-write
//! leaves the previous snapshot intact.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::memory::{EdgeRecord, GraphData, MemoryTransaction};
use super::{GraphRead, GraphStore, GraphTransaction, MemoryGraph, StorageError, Vertex};
use crate::models::{DataMap, EntityType};

/// On-disk snapshot layout
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<EdgeRecord>,
}

/// Graph store persisted to a single JSON file
pub struct FileGraphStore {
    path: PathBuf,
    graph: MemoryGraph,
}

impl FileGraphStore {
    /// Open a snapshot, starting empty if the file does not exist yet.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use archival_import_sdk::storage::FileGraphStore;
    ///
    /// let store = FileGraphStore::open("graph.json").unwrap();
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let graph = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| StorageError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
            let snapshot: Snapshot = serde_json::from_str(&content)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            info!(
                path = %path.display(),
                vertices = snapshot.vertices.len(),
                "Loaded graph snapshot"
            );
            MemoryGraph::from_data(GraphData::from_records(snapshot.vertices, snapshot.edges)?)
        } else {
            MemoryGraph::new()
        };
        Ok(Self { path, graph })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }

    fn write_snapshot(path: &Path, data: &GraphData) -> Result<(), StorageError> {
        let snapshot = Snapshot {
            vertices: data.vertices(),
            edges: data.edges(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::IoError(format!("Failed to create directory: {}", e)))?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| StorageError::IoError(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .map_err(|e| StorageError::IoError(format!("Failed to replace {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Snapshot written");
        Ok(())
    }
}

impl GraphRead for FileGraphStore {
    fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.graph.vertex(id)
    }

    fn out_edges(&self, id: &str, label: &str) -> Vec<String> {
        self.graph.out_edges(id, label)
    }

    fn in_edges(&self, id: &str, label: &str) -> Vec<String> {
        self.graph.in_edges(id, label)
    }

    fn vertices_of_type(&self, entity_type: EntityType) -> Vec<String> {
        self.graph.vertices_of_type(entity_type)
    }

    fn vertex_count(&self) -> usize {
        self.graph.vertex_count()
    }
}

impl GraphStore for FileGraphStore {
    fn begin(&mut self) -> Result<Box<dyn GraphTransaction + '_>, StorageError> {
        let path = self.path.clone();
        let inner = self.graph.transaction();
        Ok(Box::new(FileTransaction { path, inner }))
    }
}

/// Memory transaction that also persists the snapshot on commit
struct FileTransaction<'a> {
    path: PathBuf,
    inner: MemoryTransaction<'a>,
}

impl GraphRead for FileTransaction<'_> {
    fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.inner.vertex(id)
    }

    fn out_edges(&self, id: &str, label: &str) -> Vec<String> {
        self.inner.out_edges(id, label)
    }

    fn in_edges(&self, id: &str, label: &str) -> Vec<String> {
        self.inner.in_edges(id, label)
    }

    fn vertices_of_type(&self, entity_type: EntityType) -> Vec<String> {
        self.inner.vertices_of_type(entity_type)
    }

    fn vertex_count(&self) -> usize {
        self.inner.vertex_count()
    }
}

impl GraphTransaction for FileTransaction<'_> {
    fn create_vertex(
        &mut self,
        id: &str,
        entity_type: EntityType,
        properties: DataMap,
    ) -> Result<(), StorageError> {
        self.inner.create_vertex(id, entity_type, properties)
    }

    fn set_properties(&mut self, id: &str, properties: DataMap) -> Result<(), StorageError> {
        self.inner.set_properties(id, properties)
    }

    fn remove_vertex(&mut self, id: &str) -> Result<(), StorageError> {
        self.inner.remove_vertex(id)
    }

    fn add_edge(&mut self, from: &str, label: &str, to: &str, ordinal: u32) -> Result<(), StorageError> {
        self.inner.add_edge(from, label, to, ordinal)
    }

    fn remove_edge(&mut self, from: &str, label: &str, to: &str) -> Result<bool, StorageError> {
        self.inner.remove_edge(from, label, to)
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let FileTransaction { path, inner } = *self;
        // Write before applying so a failed write leaves memory untouched
        Self::write_pending(&path, &inner)?;
        inner.apply();
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        debug!(path = %self.path.display(), "File transaction rolled back");
    }
}

impl FileTransaction<'_> {
    fn write_pending(path: &Path, inner: &MemoryTransaction<'_>) -> Result<(), StorageError> {
        FileGraphStore::write_snapshot(path, inner.working())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commit_writes_snapshot_and_reopen_loads_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");

        let mut store = FileGraphStore::open(&path).unwrap();
        let mut txn = store.begin().unwrap();
        txn.create_vertex("gb", EntityType::Country, DataMap::new()).unwrap();
        txn.create_vertex("gb-r1", EntityType::Repository, DataMap::new()).unwrap();
        txn.add_edge("gb-r1", "hasCountry", "gb", 0).unwrap();
        txn.commit().unwrap();
        assert!(path.exists());

        let reopened = FileGraphStore::open(&path).unwrap();
        assert_eq!(reopened.vertex_count(), 2);
        assert!(reopened.has_edge("gb-r1", "hasCountry", "gb"));
    }

    #[test]
    fn test_rollback_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");

        let mut store = FileGraphStore::open(&path).unwrap();
        let mut txn = store.begin().unwrap();
        txn.create_vertex("gb", EntityType::Country, DataMap::new()).unwrap();
        txn.rollback();
        assert!(!path.exists());
        assert_eq!(store.vertex_count(), 0);
    }
}
