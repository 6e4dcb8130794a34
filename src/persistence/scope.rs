//! Ownership scopes
//!
//! A scope is the entity that owns another (country, repository, parent
//! unit, vocabulary). Its id path is rebuilt from the graph each time by
//! walking `hasPermissionScope` edges upwards, so renaming an ancestor's
//! identifier is picked up by the next import.

use std::collections::HashSet;

use super::PersistError;
use crate::models::EntityType;
use crate::storage::GraphRead;

/// Edge from an entity to the scope that owns it.
pub const HAS_PERMISSION_SCOPE: &str = "hasPermissionScope";

/// The scope a bundle is persisted into
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scope {
    id: Option<String>,
    entity_type: Option<EntityType>,
    id_path: Vec<String>,
}

impl Scope {
    /// The root scope: no owner, empty id path.
    pub fn system() -> Self {
        Self::default()
    }

    /// Resolve an existing entity as a scope.
    pub fn resolve<G: GraphRead + ?Sized>(graph: &G, id: &str) -> Result<Self, PersistError> {
        let vertex = graph
            .vertex(id)
            .ok_or_else(|| PersistError::NotFound(format!("scope '{}'", id)))?;
        Ok(Self {
            id: Some(vertex.id.clone()),
            entity_type: Some(vertex.entity_type),
            id_path: id_path(graph, id)?,
        })
    }

    /// Scope for entities nested inside a child of this scope.
    pub fn nested(&self, id: &str, entity_type: EntityType, identifier: &str) -> Self {
        let mut id_path = self.id_path.clone();
        id_path.push(identifier.to_string());
        Self {
            id: Some(id.to_string()),
            entity_type: Some(entity_type),
            id_path,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn entity_type(&self) -> Option<EntityType> {
        self.entity_type
    }

    pub fn id_path(&self) -> &[String] {
        &self.id_path
    }

    pub fn is_system(&self) -> bool {
        self.id.is_none()
    }
}

/// Local identifiers of `id` and its ancestors, outermost first.
pub fn id_path<G: GraphRead + ?Sized>(graph: &G, id: &str) -> Result<Vec<String>, PersistError> {
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(id.to_string());

    while let Some(node) = current {
        if !seen.insert(node.clone()) {
            return Err(PersistError::Integrity(format!(
                "scope cycle detected at '{}'",
                node
            )));
        }
        let vertex = graph
            .vertex(&node)
            .ok_or_else(|| PersistError::NotFound(format!("scope '{}'", node)))?;
        let identifier = vertex
            .properties
            .get(crate::models::entity_type::IDENTIFIER_KEY)
            .and_then(|v| v.first_text())
            .ok_or_else(|| {
                PersistError::Integrity(format!("scope '{}' has no identifier", node))
            })?;
        path.push(identifier);
        current = graph.out_edges(&node, HAS_PERMISSION_SCOPE).into_iter().next();
    }

    path.reverse();
    Ok(path)
}
