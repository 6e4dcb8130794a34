//! Persistence outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::bundle::{Bundle, DataMap};
use super::entity_type::{EntityType, IDENTIFIER_KEY};

/// Outcome of one persistence attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationState {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationState::Created => write!(f, "created"),
            MutationState::Updated => write!(f, "updated"),
            MutationState::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Typed view over a persisted vertex
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub entity_type: EntityType,
    pub data: DataMap,
}

impl Entity {
    pub fn identifier(&self) -> Option<&str> {
        self.data.get(IDENTIFIER_KEY).and_then(|v| v.as_str())
    }
}

/// Result of persisting one bundle
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    state: MutationState,
    node: T,
    prior: Option<Bundle>,
    version_id: Option<String>,
}

impl<T> Mutation<T> {
    pub fn created(node: T) -> Self {
        Self {
            state: MutationState::Created,
            node,
            prior: None,
            version_id: None,
        }
    }

    pub fn unchanged(node: T) -> Self {
        Self {
            state: MutationState::Unchanged,
            node,
            prior: None,
            version_id: None,
        }
    }

    /// An update, carrying the prior state and the version that stores it.
    pub fn updated(node: T, prior: Bundle, version_id: Option<String>) -> Self {
        Self {
            state: MutationState::Updated,
            node,
            prior: Some(prior),
            version_id,
        }
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn node(&self) -> &T {
        &self.node
    }

    pub fn into_node(self) -> T {
        self.node
    }

    pub fn prior(&self) -> Option<&Bundle> {
        self.prior.as_ref()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.state == MutationState::Created
    }

    pub fn is_updated(&self) -> bool {
        self.state == MutationState::Updated
    }

    pub fn is_unchanged(&self) -> bool {
        self.state == MutationState::Unchanged
    }

    /// Created or updated.
    pub fn has_changed(&self) -> bool {
        !self.is_unchanged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_state_display() {
        assert_eq!(MutationState::Created.to_string(), "created");
        assert_eq!(MutationState::Updated.to_string(), "updated");
        assert_eq!(MutationState::Unchanged.to_string(), "unchanged");
    }

    #[test]
    fn test_mutation_predicates() {
        let prior = Bundle::new(EntityType::DocumentaryUnit);
        let m = Mutation::updated("repoa-p1", prior, Some("version-1".to_string()));
        assert!(m.is_updated());
        assert!(m.has_changed());
        assert_eq!(m.version_id(), Some("version-1"));
        assert!(m.prior().is_some());

        let u = Mutation::unchanged("repoa-p1");
        assert!(!u.has_changed());
        assert!(u.prior().is_none());
        assert_eq!(u.into_node(), "repoa-p1");
    }
}
