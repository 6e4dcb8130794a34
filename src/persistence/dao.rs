//! Diff-based bundle persistence
//!
//! `persist` stages a bundle (validation, id generation, sibling checks),
//! then either creates the whole tree, or compares it with the stored
//! entity and rewrites only what differs. Dependent children are replaced
//! as a set: children missing from the incoming bundle are deleted, new
//! ones created and changed ones updated recursively. A version vertex with
//! the prior state is written before an entity is updated.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::Actor;
use super::scope::Scope;
use super::PersistError;
use crate::convert::{self, DEFAULT_DEPTH, Serializer};
use crate::identifier::{self, IdError};
use crate::models::entity_type::IDENTIFIER_KEY;
use crate::models::{Bundle, DataMap, DataValue, Entity, EntityType, ErrorSet, IdStrategy, Mutation};
use crate::storage::{GraphRead, GraphTransaction};
use crate::validation::{self, ValidationError};

/// Edge from an entity to the versions recording its earlier states.
pub const LIFECYCLE_VERSION: &str = "lifecycleVersion";

/// Persists bundle trees inside a caller-owned transaction
#[derive(Debug, Clone)]
pub struct BundleDao {
    allow_updates: bool,
}

impl Default for BundleDao {
    fn default() -> Self {
        Self {
            allow_updates: true,
        }
    }
}

impl BundleDao {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to change existing entities when `false`.
    pub fn with_updates_allowed(mut self, allow: bool) -> Self {
        self.allow_updates = allow;
        self
    }

    /// Create or update the entity described by `bundle` inside `scope`.
    pub fn persist<T: GraphTransaction + ?Sized>(
        &self,
        txn: &mut T,
        bundle: &Bundle,
        scope: &Scope,
        actor: &Actor,
    ) -> Result<Mutation<Entity>, PersistError> {
        let staged = self.stage(bundle, scope)?;
        let id = staged_id(&staged)?;

        match txn.vertex(&id).map(|v| v.entity_type) {
            None => self.create_staged(txn, &staged),
            Some(existing) if existing != staged.entity_type() => {
                Err(type_collision(&id, existing, staged.entity_type()))
            }
            Some(_) => self.update_staged(txn, &staged, actor),
        }
    }

    /// Create a new entity; fails if the id is already taken.
    pub fn create<T: GraphTransaction + ?Sized>(
        &self,
        txn: &mut T,
        bundle: &Bundle,
        scope: &Scope,
    ) -> Result<Mutation<Entity>, PersistError> {
        let staged = self.stage(bundle, scope)?;
        let id = staged_id(&staged)?;
        if txn.contains(&id) {
            return Err(PersistError::Integrity(format!("'{}' already exists", id)));
        }
        self.create_staged(txn, &staged)
    }

    /// Update an existing entity; fails if it does not exist.
    pub fn update<T: GraphTransaction + ?Sized>(
        &self,
        txn: &mut T,
        bundle: &Bundle,
        scope: &Scope,
        actor: &Actor,
    ) -> Result<Mutation<Entity>, PersistError> {
        let staged = self.stage(bundle, scope)?;
        let id = staged_id(&staged)?;
        match txn.vertex(&id).map(|v| v.entity_type) {
            None => Err(PersistError::NotFound(id)),
            Some(existing) if existing != staged.entity_type() => {
                Err(type_collision(&id, existing, staged.entity_type()))
            }
            Some(_) => self.update_staged(txn, &staged, actor),
        }
    }

    /// Delete an entity and its dependent tree, returning how many
    /// vertices were removed.
    pub fn delete<T: GraphTransaction + ?Sized>(&self, txn: &mut T, id: &str) -> Result<usize, PersistError> {
        if !txn.contains(id) {
            return Err(PersistError::NotFound(id.to_string()));
        }
        self.delete_tree(txn, id)
    }

    /// Snapshot an entity into a `Version` vertex, then delete it.
    ///
    /// Returns the version id. The version outlives the entity and keeps
    /// its id in `itemId`.
    pub fn delete_versioned<T: GraphTransaction + ?Sized>(
        &self,
        txn: &mut T,
        id: &str,
        actor: &Actor,
    ) -> Result<String, PersistError> {
        if !txn.contains(id) {
            return Err(PersistError::NotFound(id.to_string()));
        }
        let prior = Serializer::with_depth(DEFAULT_DEPTH).entity_to_bundle(txn, id)?;
        let version_id = write_version(txn, &prior, actor)?;
        self.delete_tree(txn, id)?;
        debug!(id, version = %version_id, "Deleted with version");
        Ok(version_id)
    }

    /// Add a cross-reference edge between two persisted entities.
    ///
    /// Returns `false` when the edge already existed.
    pub fn link<T: GraphTransaction + ?Sized>(
        &self,
        txn: &mut T,
        from: &str,
        label: &str,
        to: &str,
    ) -> Result<bool, PersistError> {
        if from == to {
            return Err(PersistError::Integrity(format!(
                "'{}' can not have a {} link to itself",
                from, label
            )));
        }
        for id in [from, to] {
            if !txn.contains(id) {
                return Err(PersistError::NotFound(id.to_string()));
            }
        }
        if txn.has_edge(from, label, to) {
            return Ok(false);
        }
        let ordinal = txn.out_edges(from, label).len() as u32;
        txn.add_edge(from, label, to, ordinal)?;
        debug!(from, label, to, "Link created");
        Ok(true)
    }

    /// Validate a bundle and assign generated ids throughout its tree.
    pub fn stage(&self, bundle: &Bundle, scope: &Scope) -> Result<Bundle, PersistError> {
        validation::check(bundle)?;

        let fail = |errors: ErrorSet| {
            PersistError::Validation(ValidationError::new(
                bundle.entity_type(),
                bundle.id().map(str::to_string),
                errors,
            ))
        };

        let id = top_level_id(bundle, scope).map_err(fail)?;
        let staged = assign_child_ids(bundle.clone().with_id(id)).map_err(fail)?;
        check_sibling_ids(&staged).map_err(fail)?;
        Ok(staged)
    }

    fn create_staged<T: GraphTransaction + ?Sized>(
        &self,
        txn: &mut T,
        staged: &Bundle,
    ) -> Result<Mutation<Entity>, PersistError> {
        self.write_tree(txn, staged)?;
        let id = staged_id(staged)?;
        debug!(id = %id, entity_type = %staged.entity_type(), "Created");
        Ok(Mutation::created(frame(txn, &id)?))
    }

    fn update_staged<T: GraphTransaction + ?Sized>(
        &self,
        txn: &mut T,
        staged: &Bundle,
        actor: &Actor,
    ) -> Result<Mutation<Entity>, PersistError> {
        let id = staged_id(staged)?;
        let depth = staged.depth().max(DEFAULT_DEPTH);
        let prior = Serializer::with_depth(depth).entity_to_bundle(txn, &id)?;

        if prior.same_content(staged) {
            debug!(id = %id, "Unchanged");
            return Ok(Mutation::unchanged(frame(txn, &id)?));
        }
        if !self.allow_updates {
            return Err(PersistError::UpdateNotAllowed(id));
        }

        let version_id = write_version(txn, &prior, actor)?;
        self.update_tree(txn, staged)?;
        debug!(id = %id, version = %version_id, "Updated");
        Ok(Mutation::updated(frame(txn, &id)?, prior, Some(version_id)))
    }

    /// Create `bundle` (or bring a leftover vertex in line) with its children.
    fn write_tree<T: GraphTransaction + ?Sized>(&self, txn: &mut T, bundle: &Bundle) -> Result<(), PersistError> {
        let id = staged_id(bundle)?;
        match txn.vertex(&id).map(|v| v.entity_type) {
            Some(existing) if existing != bundle.entity_type() => {
                Err(type_collision(&id, existing, bundle.entity_type()))
            }
            Some(_) => {
                warn!(id = %id, "Reusing existing vertex for new parent");
                self.update_tree(txn, bundle)
            }
            None => {
                txn.create_vertex(&id, bundle.entity_type(), bundle.data().clone())?;
                for (label, children) in bundle.relations() {
                    for (ordinal, child) in children.iter().enumerate() {
                        self.write_tree(txn, child)?;
                        txn.add_edge(&id, label, &staged_id(child)?, ordinal as u32)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Make the stored tree rooted at `bundle`'s id match it.
    fn update_tree<T: GraphTransaction + ?Sized>(&self, txn: &mut T, bundle: &Bundle) -> Result<(), PersistError> {
        let id = staged_id(bundle)?;
        let stored = txn
            .vertex(&id)
            .map(|v| v.properties.clone())
            .ok_or_else(|| PersistError::NotFound(id.clone()))?;
        if &stored != bundle.data() {
            txn.set_properties(&id, bundle.data().clone())?;
        }

        for dependent in bundle.entity_type().schema().dependents {
            let incoming = bundle.relation(dependent.label);
            let keep: HashSet<String> = incoming
                .iter()
                .filter_map(|c| c.id().map(str::to_string))
                .collect();

            for existing in txn.out_edges(&id, dependent.label) {
                if !keep.contains(&existing) {
                    self.delete_tree(txn, &existing)?;
                }
            }

            for (ordinal, child) in incoming.iter().enumerate() {
                let child_id = staged_id(child)?;
                match txn.vertex(&child_id).map(|v| v.entity_type) {
                    Some(existing) if existing != child.entity_type() => {
                        return Err(type_collision(&child_id, existing, child.entity_type()));
                    }
                    Some(_) => {
                        let current = Serializer::new().entity_to_bundle(txn, &child_id)?;
                        if !current.same_content(child) {
                            self.update_tree(txn, child)?;
                        }
                    }
                    None => self.write_tree(txn, child)?,
                }
                txn.add_edge(&id, dependent.label, &child_id, ordinal as u32)?;
            }
        }
        Ok(())
    }

    fn delete_tree<T: GraphTransaction + ?Sized>(&self, txn: &mut T, id: &str) -> Result<usize, PersistError> {
        let entity_type = match txn.vertex(id) {
            Some(v) => v.entity_type,
            None => return Ok(0),
        };
        let mut removed = 0;
        for dependent in entity_type.schema().dependents {
            for child in txn.out_edges(id, dependent.label) {
                removed += self.delete_tree(txn, &child)?;
            }
        }
        txn.remove_vertex(id)?;
        debug!(id, "Deleted");
        Ok(removed + 1)
    }
}

/// Prior states of an entity, oldest first.
pub fn version_history<G: GraphRead + ?Sized>(graph: &G, id: &str) -> Result<Vec<Bundle>, PersistError> {
    graph
        .out_edges(id, LIFECYCLE_VERSION)
        .iter()
        .filter_map(|version| graph.vertex(version))
        .filter_map(|v| v.properties.get("itemData").and_then(DataValue::as_str))
        .map(|text| convert::to_bundle(text).map_err(PersistError::from))
        .collect()
}

fn staged_id(bundle: &Bundle) -> Result<String, PersistError> {
    bundle
        .id()
        .map(str::to_string)
        .ok_or_else(|| PersistError::Integrity(format!("{} bundle has no id", bundle.entity_type())))
}

fn frame<T: GraphRead + ?Sized>(txn: &T, id: &str) -> Result<Entity, PersistError> {
    txn.frame(id).ok_or_else(|| PersistError::NotFound(id.to_string()))
}

fn type_collision(id: &str, existing: EntityType, incoming: EntityType) -> PersistError {
    PersistError::Integrity(format!(
        "id '{}' belongs to a {}, refusing to store a {} under it",
        id, existing, incoming
    ))
}

fn id_error(errors: &mut ErrorSet, field: &str, err: IdError) {
    errors.add_error(field, err.to_string());
}

/// Generated id for the root of a bundle tree.
fn top_level_id(bundle: &Bundle, scope: &Scope) -> Result<String, ErrorSet> {
    if let Some(id) = bundle.id() {
        return Ok(id.to_string());
    }

    let mut errors = ErrorSet::new();
    let generated = match bundle.entity_type().schema().id_strategy {
        IdStrategy::Hierarchical => {
            let local = bundle
                .data_value(IDENTIFIER_KEY)
                .and_then(DataValue::first_text)
                .unwrap_or_default();
            identifier::generate(scope.id_path(), &local)
                .map_err(|e| id_error(&mut errors, IDENTIFIER_KEY, e))
                .ok()
        }
        IdStrategy::Content(prefix) => {
            let local = identifier::content_local(prefix, &bundle.canonical_data());
            identifier::generate(scope.id_path(), &local)
                .map_err(|e| id_error(&mut errors, IDENTIFIER_KEY, e))
                .ok()
        }
        IdStrategy::Description => {
            errors.add_error("type", "descriptions can only be stored through the entity they describe");
            None
        }
        IdStrategy::System => {
            errors.add_error("type", "system-managed entities can not be imported");
            None
        }
    };
    generated.ok_or(errors)
}

/// Derive ids for every dependent below an already identified bundle.
fn assign_child_ids(bundle: Bundle) -> Result<Bundle, ErrorSet> {
    let parent_id = bundle.id().unwrap_or_default().to_string();
    let mut errors = ErrorSet::new();
    let mut relabelled: Vec<(String, Vec<Bundle>)> = Vec::new();

    for (label, children) in bundle.relations() {
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        let mut assigned = Vec::with_capacity(children.len());

        for (index, child) in children.iter().enumerate() {
            let id = match (child.id(), child.entity_type().schema().id_strategy) {
                (Some(id), _) => Ok(id.to_string()),
                (None, IdStrategy::Description) => identifier::description_id(
                    &parent_id,
                    child.language().unwrap_or_default(),
                    child.identifier(),
                )
                .map_err(|e| ErrorSet::new().with_error("languageCode", e.to_string())),
                (None, IdStrategy::Content(prefix)) => {
                    let canonical = child.canonical_data();
                    let seen = occurrences.entry(canonical.clone()).or_insert(0);
                    *seen += 1;
                    Ok(identifier::content_id(&parent_id, prefix, &canonical, *seen))
                }
                (None, _) => Err(ErrorSet::new().with_error("type", "can not derive a dependent id")),
            };

            match id.and_then(|id| assign_child_ids(child.clone().with_id(id))) {
                Ok(child) => assigned.push(child),
                Err(child_errors) => errors.add_relation(label.clone(), index, child_errors),
            }
        }
        relabelled.push((label.clone(), assigned));
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(relabelled
        .into_iter()
        .fold(bundle, |b, (label, children)| b.with_relations(label, children)))
}

/// Siblings must not resolve to the same id.
fn check_sibling_ids(bundle: &Bundle) -> Result<(), ErrorSet> {
    let mut errors = ErrorSet::new();
    for (label, children) in bundle.relations() {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (index, child) in children.iter().enumerate() {
            let mut child_errors = match check_sibling_ids(child) {
                Ok(()) => ErrorSet::new(),
                Err(e) => e,
            };
            if let Some(id) = child.id() {
                if let Some(first) = seen.get(id) {
                    child_errors.add_error(
                        "id",
                        format!("duplicates sibling {} ('{}')", first, id),
                    );
                } else {
                    seen.insert(id, index);
                }
            }
            errors.add_relation(label.clone(), index, child_errors);
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn write_version<T: GraphTransaction + ?Sized>(
    txn: &mut T,
    prior: &Bundle,
    actor: &Actor,
) -> Result<String, PersistError> {
    let entity_id = staged_id(prior)?;
    let version_id = format!("version-{}", Uuid::new_v4());
    let item_data = serde_json::to_string(prior).map_err(|e| PersistError::Serialization(e.to_string()))?;

    let mut properties = DataMap::new();
    properties.insert("itemId".to_string(), DataValue::from(entity_id.as_str()));
    properties.insert("itemType".to_string(), DataValue::from(prior.entity_type().as_str()));
    properties.insert("itemData".to_string(), DataValue::from(item_data));
    properties.insert("timestamp".to_string(), DataValue::from(Utc::now().to_rfc3339()));
    properties.insert("actioner".to_string(), DataValue::from(actor.id.as_str()));
    txn.create_vertex(&version_id, EntityType::Version, properties)?;

    let ordinal = txn.out_edges(&entity_id, LIFECYCLE_VERSION).len() as u32;
    txn.add_edge(&entity_id, LIFECYCLE_VERSION, &version_id, ordinal)?;
    Ok(version_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity_type::{DESCRIBES, HAS_DATE};
    use crate::models::MutationState;
    use crate::storage::{GraphStore, MemoryGraph};

    fn date(start: &str) -> Bundle {
        Bundle::new(EntityType::DatePeriod).with_data_value("startDate", start)
    }

    fn unit(identifier: &str, title: &str) -> Bundle {
        Bundle::new(EntityType::DocumentaryUnit)
            .with_data_value("identifier", identifier)
            .with_relation(
                DESCRIBES,
                Bundle::new(EntityType::DocumentaryUnitDescription)
                    .with_data_value("name", title)
                    .with_data_value("languageCode", "eng")
                    .with_relation(HAS_DATE, date("1939")),
            )
    }

    fn repo_scope(graph: &mut MemoryGraph) -> Scope {
        let dao = BundleDao::new();
        let mut txn = graph.begin().unwrap();
        let repo = Bundle::new(EntityType::Repository).with_data_value("identifier", "repoA");
        dao.persist(txn.as_mut(), &repo, &Scope::system(), &Actor::system())
            .unwrap();
        txn.commit().unwrap();
        Scope::resolve(graph, "repoa").unwrap()
    }

    #[test]
    fn test_create_then_unchanged() {
        let mut graph = MemoryGraph::new();
        let scope = repo_scope(&mut graph);
        let dao = BundleDao::new();
        let actor = Actor::system();

        let mut txn = graph.begin().unwrap();
        let first = dao.persist(txn.as_mut(), &unit("p1", "Papers"), &scope, &actor).unwrap();
        assert_eq!(first.state(), MutationState::Created);
        assert_eq!(first.node().id, "repoa-p1");
        assert!(txn.contains("repoa-p1.eng"));

        let second = dao.persist(txn.as_mut(), &unit("p1", "Papers"), &scope, &actor).unwrap();
        assert_eq!(second.state(), MutationState::Unchanged);
        assert!(txn.out_edges("repoa-p1", LIFECYCLE_VERSION).is_empty());
        txn.commit().unwrap();
    }

    #[test]
    fn test_update_writes_version_and_replaces_children() {
        let mut graph = MemoryGraph::new();
        let scope = repo_scope(&mut graph);
        let dao = BundleDao::new();
        let actor = Actor::new("importer");

        let mut txn = graph.begin().unwrap();
        dao.persist(txn.as_mut(), &unit("p1", "Papers"), &scope, &actor).unwrap();
        let old_dates = txn.out_edges("repoa-p1.eng", HAS_DATE);
        assert_eq!(old_dates.len(), 1);

        let changed = Bundle::new(EntityType::DocumentaryUnit)
            .with_data_value("identifier", "p1")
            .with_relation(
                DESCRIBES,
                Bundle::new(EntityType::DocumentaryUnitDescription)
                    .with_data_value("name", "Papers")
                    .with_data_value("languageCode", "eng")
                    .with_relation(HAS_DATE, date("1945")),
            );
        let m = dao.persist(txn.as_mut(), &changed, &scope, &actor).unwrap();
        assert_eq!(m.state(), MutationState::Updated);
        assert!(m.version_id().is_some());
        assert_eq!(
            m.prior().unwrap().relation(DESCRIBES)[0].relation(HAS_DATE)[0].data_text("startDate"),
            Some("1939")
        );

        let new_dates = txn.out_edges("repoa-p1.eng", HAS_DATE);
        assert_eq!(new_dates.len(), 1);
        assert_ne!(new_dates, old_dates);
        assert!(!txn.contains(&old_dates[0]));
        txn.commit().unwrap();

        let history = version_history(&graph, "repoa-p1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].relation(DESCRIBES)[0].name(), Some("Papers"));
    }

    #[test]
    fn test_type_collision_is_integrity_error() {
        let mut graph = MemoryGraph::new();
        let scope = repo_scope(&mut graph);
        let dao = BundleDao::new();
        let mut txn = graph.begin().unwrap();
        dao.persist(txn.as_mut(), &unit("p1", "Papers"), &scope, &Actor::system()).unwrap();

        let agent = Bundle::new(EntityType::HistoricalAgent).with_data_value("identifier", "p1");
        let err = dao
            .persist(txn.as_mut(), &agent, &scope, &Actor::system())
            .unwrap_err();
        assert!(matches!(err, PersistError::Integrity(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_validation_error_carries_path() {
        let dao = BundleDao::new();
        let bad = Bundle::new(EntityType::DocumentaryUnit)
            .with_data_value("identifier", "p1")
            .with_relation(
                DESCRIBES,
                Bundle::new(EntityType::DocumentaryUnitDescription).with_data_value("name", "x"),
            );
        match dao.stage(&bad, &Scope::system()) {
            Err(PersistError::Validation(e)) => assert_eq!(
                e.errors.paths(),
                vec!["describes[0].languageCode: missing mandatory field".to_string()]
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_identifier_is_validation_error() {
        let dao = BundleDao::new();
        let bad = Bundle::new(EntityType::DocumentaryUnit).with_data_value("identifier", "!!");
        let err = dao.stage(&bad, &Scope::system()).unwrap_err();
        assert!(matches!(err, PersistError::Validation(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_duplicate_descriptions_are_rejected() {
        let desc = Bundle::new(EntityType::DocumentaryUnitDescription)
            .with_data_value("languageCode", "eng");
        let bad = Bundle::new(EntityType::DocumentaryUnit)
            .with_data_value("identifier", "p1")
            .with_relation(DESCRIBES, desc.clone().with_data_value("name", "One"))
            .with_relation(DESCRIBES, desc.with_data_value("name", "Two"));
        let err = BundleDao::new().stage(&bad, &Scope::system()).unwrap_err();
        match err {
            PersistError::Validation(e) => {
                assert!(e.errors.paths()[0].starts_with("describes[1].id: duplicates sibling 0"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_identical_dependents_stay_distinct() {
        let desc = Bundle::new(EntityType::DocumentaryUnitDescription)
            .with_data_value("name", "Papers")
            .with_data_value("languageCode", "eng")
            .with_relation(HAS_DATE, date("1939"))
            .with_relation(HAS_DATE, date("1939"));
        let bundle = Bundle::new(EntityType::DocumentaryUnit)
            .with_data_value("identifier", "p1")
            .with_relation(DESCRIBES, desc);
        let staged = BundleDao::new().stage(&bundle, &Scope::system()).unwrap();
        let dates = staged.relation(DESCRIBES)[0].relation(HAS_DATE);
        assert_ne!(dates[0].id(), dates[1].id());
        assert_eq!(dates[1].id().map(|s| s.ends_with("-2")), Some(true));
    }

    #[test]
    fn test_updates_can_be_refused() {
        let mut graph = MemoryGraph::new();
        let scope = repo_scope(&mut graph);
        let mut txn = graph.begin().unwrap();
        BundleDao::new()
            .persist(txn.as_mut(), &unit("p1", "Papers"), &scope, &Actor::system())
            .unwrap();
        let strict = BundleDao::new().with_updates_allowed(false);
        let same = strict
            .persist(txn.as_mut(), &unit("p1", "Papers"), &scope, &Actor::system())
            .unwrap();
        assert!(same.is_unchanged());
        assert!(matches!(
            strict.persist(txn.as_mut(), &unit("p1", "Letters"), &scope, &Actor::system()),
            Err(PersistError::UpdateNotAllowed(_))
        ));
    }

    #[test]
    fn test_link_and_delete() {
        let mut graph = MemoryGraph::new();
        let scope = repo_scope(&mut graph);
        let dao = BundleDao::new();
        let mut txn = graph.begin().unwrap();
        dao.persist(txn.as_mut(), &unit("p1", "A"), &scope, &Actor::system()).unwrap();
        dao.persist(txn.as_mut(), &unit("p2", "B"), &scope, &Actor::system()).unwrap();

        assert!(dao.link(txn.as_mut(), "repoa-p1", "related", "repoa-p2").unwrap());
        assert!(!dao.link(txn.as_mut(), "repoa-p1", "related", "repoa-p2").unwrap());
        assert!(dao.link(txn.as_mut(), "repoa-p2", "related", "repoa-p1").unwrap());
        assert!(matches!(
            dao.link(txn.as_mut(), "repoa-p1", "related", "repoa-p1"),
            Err(PersistError::Integrity(_))
        ));
        assert!(matches!(
            dao.link(txn.as_mut(), "repoa-p1", "related", "nowhere"),
            Err(PersistError::NotFound(_))
        ));

        // unit, description, date
        assert_eq!(dao.delete(txn.as_mut(), "repoa-p1").unwrap(), 3);
        assert!(!txn.contains("repoa-p1.eng"));
        assert!(txn.in_edges("repoa-p2", "related").is_empty());
    }

    #[test]
    fn test_delete_versioned_keeps_last_state() {
        let mut graph = MemoryGraph::new();
        let scope = repo_scope(&mut graph);
        let dao = BundleDao::new();
        let actor = Actor::new("archivist");
        let mut txn = graph.begin().unwrap();
        dao.persist(txn.as_mut(), &unit("p1", "Papers"), &scope, &actor).unwrap();

        let version_id = dao.delete_versioned(txn.as_mut(), "repoa-p1", &actor).unwrap();
        assert!(!txn.contains("repoa-p1"));
        assert!(!txn.contains("repoa-p1.eng"));

        let version = txn.vertex(&version_id).unwrap();
        assert_eq!(version.entity_type, EntityType::Version);
        assert_eq!(version.properties.get("itemId"), Some(&DataValue::from("repoa-p1")));
        let text = version.properties.get("itemData").and_then(DataValue::as_str).unwrap();
        let prior = convert::to_bundle(text).unwrap();
        assert_eq!(prior.relation(DESCRIBES)[0].name(), Some("Papers"));

        assert!(matches!(
            dao.delete_versioned(txn.as_mut(), "repoa-p1", &actor),
            Err(PersistError::NotFound(_))
        ));
    }
}
