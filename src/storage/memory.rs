//! In-memory graph store
//!
//! Vertices and labelled edges live in a petgraph `StableGraph` so indexes
//! stay valid across removals. A transaction works on a private copy of the
//! graph and swaps it in on commit, which gives all-or-nothing semantics.

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{GraphRead, GraphStore, GraphTransaction, StorageError, Vertex};
use crate::models::{DataMap, EntityType};

/// Edge weight: label plus position among siblings with the same label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    pub label: String,
    pub ordinal: u32,
}

/// Graph contents shared by the store and its transactions
#[derive(Debug, Clone, Default)]
pub struct GraphData {
    graph: StableGraph<Vertex, EdgeData>,
    index: HashMap<String, NodeIndex>,
}

/// Flat edge record used for snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: String,
    pub label: String,
    pub to: String,
    #[serde(default)]
    pub ordinal: u32,
}

impl GraphData {
    fn node(&self, id: &str) -> Result<NodeIndex, StorageError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| StorageError::VertexNotFound(id.to_string()))
    }

    fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.index.get(id).and_then(|n| self.graph.node_weight(*n))
    }

    fn neighbours(&self, id: &str, label: &str, direction: Direction) -> Vec<String> {
        let Some(node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut found: Vec<(u32, &str)> = self
            .graph
            .edges_directed(*node, direction)
            .filter(|e| e.weight().label == label)
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                self.graph
                    .node_weight(other)
                    .map(|v| (e.weight().ordinal, v.id.as_str()))
            })
            .collect();
        found.sort();
        found.into_iter().map(|(_, id)| id.to_string()).collect()
    }

    fn vertices_of_type(&self, entity_type: EntityType) -> Vec<String> {
        let mut ids: Vec<String> = self
            .graph
            .node_indices()
            .filter_map(|n| self.graph.node_weight(n))
            .filter(|v| v.entity_type == entity_type)
            .map(|v| v.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn create_vertex(
        &mut self,
        id: &str,
        entity_type: EntityType,
        properties: DataMap,
    ) -> Result<(), StorageError> {
        if self.index.contains_key(id) {
            return Err(StorageError::DuplicateVertex(id.to_string()));
        }
        let node = self.graph.add_node(Vertex {
            id: id.to_string(),
            entity_type,
            properties,
        });
        self.index.insert(id.to_string(), node);
        Ok(())
    }

    fn set_properties(&mut self, id: &str, properties: DataMap) -> Result<(), StorageError> {
        let node = self.node(id)?;
        let vertex = self
            .graph
            .node_weight_mut(node)
            .ok_or_else(|| StorageError::VertexNotFound(id.to_string()))?;
        vertex.properties = properties;
        Ok(())
    }

    fn remove_vertex(&mut self, id: &str) -> Result<(), StorageError> {
        let node = self.node(id)?;
        self.graph.remove_node(node);
        self.index.remove(id);
        Ok(())
    }

    fn add_edge(&mut self, from: &str, label: &str, to: &str, ordinal: u32) -> Result<(), StorageError> {
        let source = self.node(from)?;
        let target = self.node(to)?;
        let existing = self
            .graph
            .edges_directed(source, Direction::Outgoing)
            .find(|e| e.target() == target && e.weight().label == label)
            .map(|e| e.id());
        match existing {
            Some(edge) => {
                if let Some(weight) = self.graph.edge_weight_mut(edge) {
                    weight.ordinal = ordinal;
                }
            }
            None => {
                self.graph.add_edge(
                    source,
                    target,
                    EdgeData {
                        label: label.to_string(),
                        ordinal,
                    },
                );
            }
        }
        Ok(())
    }

    fn remove_edge(&mut self, from: &str, label: &str, to: &str) -> Result<bool, StorageError> {
        let source = self.node(from)?;
        let target = self.node(to)?;
        let existing = self
            .graph
            .edges_directed(source, Direction::Outgoing)
            .find(|e| e.target() == target && e.weight().label == label)
            .map(|e| e.id());
        Ok(match existing {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        })
    }

    /// All vertices, ordered by id.
    pub fn vertices(&self) -> Vec<Vertex> {
        let mut vertices: Vec<Vertex> = self
            .graph
            .node_indices()
            .filter_map(|n| self.graph.node_weight(n))
            .cloned()
            .collect();
        vertices.sort_by(|a, b| a.id.cmp(&b.id));
        vertices
    }

    /// All edges as flat records, ordered for stable output.
    pub fn edges(&self) -> Vec<EdgeRecord> {
        let mut edges: Vec<EdgeRecord> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (source, target) = self.graph.edge_endpoints(e)?;
                let weight = self.graph.edge_weight(e)?;
                let from = self.graph.node_weight(source)?;
                let to = self.graph.node_weight(target)?;
                Some(EdgeRecord {
                    from: from.id.clone(),
                    label: weight.label.clone(),
                    to: to.id.clone(),
                    ordinal: weight.ordinal,
                })
            })
            .collect();
        edges.sort_by(|a, b| {
            (&a.from, &a.label, a.ordinal, &a.to).cmp(&(&b.from, &b.label, b.ordinal, &b.to))
        });
        edges
    }

    /// Rebuild graph contents from flat records.
    pub fn from_records(vertices: Vec<Vertex>, edges: Vec<EdgeRecord>) -> Result<Self, StorageError> {
        let mut data = GraphData::default();
        for v in vertices {
            data.create_vertex(&v.id, v.entity_type, v.properties)?;
        }
        for e in edges {
            data.add_edge(&e.from, &e.label, &e.to, e.ordinal)?;
        }
        Ok(data)
    }
}

/// Petgraph-backed property graph
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    data: GraphData,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: GraphData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &GraphData {
        &self.data
    }

    pub fn edge_count(&self) -> usize {
        self.data.graph.edge_count()
    }

    /// Open a concrete transaction over this graph.
    pub fn transaction(&mut self) -> MemoryTransaction<'_> {
        debug!(vertices = self.data.graph.node_count(), "Opening transaction");
        MemoryTransaction::new(&mut self.data)
    }
}

impl GraphRead for MemoryGraph {
    fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.data.vertex(id)
    }

    fn out_edges(&self, id: &str, label: &str) -> Vec<String> {
        self.data.neighbours(id, label, Direction::Outgoing)
    }

    fn in_edges(&self, id: &str, label: &str) -> Vec<String> {
        self.data.neighbours(id, label, Direction::Incoming)
    }

    fn vertices_of_type(&self, entity_type: EntityType) -> Vec<String> {
        self.data.vertices_of_type(entity_type)
    }

    fn vertex_count(&self) -> usize {
        self.data.graph.node_count()
    }
}

impl GraphStore for MemoryGraph {
    fn begin(&mut self) -> Result<Box<dyn GraphTransaction + '_>, StorageError> {
        Ok(Box::new(self.transaction()))
    }
}

/// Transaction over a private working copy
pub struct MemoryTransaction<'a> {
    target: &'a mut GraphData,
    working: GraphData,
}

impl<'a> MemoryTransaction<'a> {
    pub fn new(target: &'a mut GraphData) -> Self {
        let working = target.clone();
        Self { target, working }
    }

    pub fn working(&self) -> &GraphData {
        &self.working
    }

    /// Apply the working copy to the target and hand back the result.
    pub(crate) fn apply(self) -> &'a GraphData {
        *self.target = self.working;
        self.target
    }
}

impl GraphRead for MemoryTransaction<'_> {
    fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.working.vertex(id)
    }

    fn out_edges(&self, id: &str, label: &str) -> Vec<String> {
        self.working.neighbours(id, label, Direction::Outgoing)
    }

    fn in_edges(&self, id: &str, label: &str) -> Vec<String> {
        self.working.neighbours(id, label, Direction::Incoming)
    }

    fn vertices_of_type(&self, entity_type: EntityType) -> Vec<String> {
        self.working.vertices_of_type(entity_type)
    }

    fn vertex_count(&self) -> usize {
        self.working.graph.node_count()
    }
}

impl GraphTransaction for MemoryTransaction<'_> {
    fn create_vertex(
        &mut self,
        id: &str,
        entity_type: EntityType,
        properties: DataMap,
    ) -> Result<(), StorageError> {
        self.working.create_vertex(id, entity_type, properties)
    }

    fn set_properties(&mut self, id: &str, properties: DataMap) -> Result<(), StorageError> {
        self.working.set_properties(id, properties)
    }

    fn remove_vertex(&mut self, id: &str) -> Result<(), StorageError> {
        self.working.remove_vertex(id)
    }

    fn add_edge(&mut self, from: &str, label: &str, to: &str, ordinal: u32) -> Result<(), StorageError> {
        self.working.add_edge(from, label, to, ordinal)
    }

    fn remove_edge(&mut self, from: &str, label: &str, to: &str) -> Result<bool, StorageError> {
        self.working.remove_edge(from, label, to)
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let txn = *self;
        let data = txn.apply();
        debug!(vertices = data.graph.node_count(), "Transaction committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        debug!("Transaction rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataValue;

    fn props(name: &str) -> DataMap {
        let mut map = DataMap::new();
        map.insert("name".to_string(), DataValue::from(name));
        map
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let mut graph = MemoryGraph::new();
        let mut txn = graph.begin().unwrap();
        txn.create_vertex("a", EntityType::Country, props("A")).unwrap();
        assert!(txn.contains("a"));
        txn.commit().unwrap();
        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.vertex("a").unwrap().entity_type, EntityType::Country);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut graph = MemoryGraph::new();
        let mut txn = graph.begin().unwrap();
        txn.create_vertex("a", EntityType::Country, props("A")).unwrap();
        txn.rollback();
        assert_eq!(graph.vertex_count(), 0);
    }

    #[test]
    fn test_duplicate_vertex_is_rejected() {
        let mut graph = MemoryGraph::new();
        let mut txn = graph.begin().unwrap();
        txn.create_vertex("a", EntityType::Country, DataMap::new()).unwrap();
        assert!(matches!(
            txn.create_vertex("a", EntityType::Country, DataMap::new()),
            Err(StorageError::DuplicateVertex(_))
        ));
    }

    #[test]
    fn test_edges_follow_ordinals() {
        let mut graph = MemoryGraph::new();
        let mut txn = graph.begin().unwrap();
        for id in ["p", "x", "y", "z"] {
            txn.create_vertex(id, EntityType::DatePeriod, DataMap::new()).unwrap();
        }
        txn.add_edge("p", "hasDate", "z", 0).unwrap();
        txn.add_edge("p", "hasDate", "x", 1).unwrap();
        txn.add_edge("p", "hasDate", "y", 2).unwrap();
        assert_eq!(txn.out_edges("p", "hasDate"), vec!["z", "x", "y"]);

        // Re-adding moves the edge instead of duplicating it
        txn.add_edge("p", "hasDate", "z", 3).unwrap();
        assert_eq!(txn.out_edges("p", "hasDate"), vec!["x", "y", "z"]);
        assert_eq!(txn.in_edges("x", "hasDate"), vec!["p"]);

        assert!(txn.remove_edge("p", "hasDate", "x").unwrap());
        assert!(!txn.remove_edge("p", "hasDate", "x").unwrap());
        txn.remove_vertex("y").unwrap();
        assert_eq!(txn.out_edges("p", "hasDate"), vec!["z"]);
    }

    #[test]
    fn test_records_round_trip() {
        let mut graph = MemoryGraph::new();
        let mut txn = graph.begin().unwrap();
        txn.create_vertex("a", EntityType::Country, props("A")).unwrap();
        txn.create_vertex("b", EntityType::Repository, props("B")).unwrap();
        txn.add_edge("b", "hasCountry", "a", 0).unwrap();
        txn.commit().unwrap();

        let rebuilt =
            GraphData::from_records(graph.data().vertices(), graph.data().edges()).unwrap();
        let copy = MemoryGraph::from_data(rebuilt);
        assert_eq!(copy.vertex_count(), 2);
        assert!(copy.has_edge("b", "hasCountry", "a"));
    }
}
