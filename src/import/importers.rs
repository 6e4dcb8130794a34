//! Importers for the supported entity families
//!
//! An importer takes the bundles a handler emits, persists them under the
//! run's scope through the [`ImportContext`] and adds the structural edges
//! that tie each entity to its owner.

use tracing::{debug, warn};

use super::skos::{BROADER, RELATED};
use super::{ImportContext, ImportError, ImportItem, Importer, CHILD_ITEM};
use crate::identifier;
use crate::models::{Bundle, EntityType};
use crate::persistence::scope::HAS_PERMISSION_SCOPE;
use crate::persistence::{PersistError, Scope};
use crate::validation::flatten_single_valued;

pub const HELD_BY: &str = "heldBy";
pub const CHILD_OF: &str = "childOf";
pub const IN_AUTHORITATIVE_SET: &str = "inAuthoritativeSet";
pub const HAS_COUNTRY: &str = "hasCountry";

/// Link `id` to the scope that owns it, plus the structural edge its
/// type has towards that kind of scope.
fn link_to_scope(ctx: &mut ImportContext<'_>, id: &str, entity_type: EntityType, scope: &Scope) -> Result<(), ImportError> {
    let Some(scope_id) = scope.id() else {
        return Ok(());
    };
    ctx.link(id, HAS_PERMISSION_SCOPE, scope_id)?;

    let structural = match (entity_type, scope.entity_type()) {
        (EntityType::DocumentaryUnit, Some(EntityType::Repository)) => Some(HELD_BY),
        (EntityType::DocumentaryUnit, Some(EntityType::DocumentaryUnit)) => Some(CHILD_OF),
        (EntityType::HistoricalAgent, Some(EntityType::AuthoritativeSet)) => Some(IN_AUTHORITATIVE_SET),
        (EntityType::Concept, Some(EntityType::Vocabulary)) => Some(IN_AUTHORITATIVE_SET),
        (EntityType::Repository, Some(EntityType::Country)) => Some(HAS_COUNTRY),
        _ => None,
    };
    if let Some(label) = structural {
        ctx.link(id, label, scope_id)?;
    }
    Ok(())
}

/// Persist one flat record and link it to its scope. Returns the new
/// entity id, or `None` when a tolerant run skipped the record.
fn import_flat(ctx: &mut ImportContext<'_>, bundle: &Bundle, location: &str) -> Result<Option<String>, ImportError> {
    let scope = ctx.scope().clone();
    let result = ctx.persist(bundle, &scope).and_then(|mutation| {
        let id = mutation.node().id.clone();
        link_to_scope(ctx, &id, bundle.entity_type(), &scope)?;
        Ok(id)
    });
    ctx.tolerate(location, result)
}

/// Imports DocumentaryUnit hierarchies
///
/// Nested units arrive in the `childItem` relation of their parent. A
/// parent is always persisted before its children so each child can be
/// scoped by, and linked to, its parent.
#[derive(Debug, Default)]
pub struct UnitImporter;

impl UnitImporter {
    pub fn new() -> Self {
        Self
    }

    fn import_unit(
        &mut self,
        ctx: &mut ImportContext<'_>,
        bundle: Bundle,
        scope: &Scope,
        location: &str,
    ) -> Result<(), ImportError> {
        let (bundle, children) = bundle.take_relation(CHILD_ITEM);
        let result = ctx.persist(&bundle, scope).and_then(|mutation| {
            let id = mutation.node().id.clone();
            link_to_scope(ctx, &id, EntityType::DocumentaryUnit, scope)?;
            Ok(id)
        });
        let Some(id) = ctx.tolerate(location, result)? else {
            if !children.is_empty() {
                warn!(location, children = children.len(), "Skipping children of failed unit");
            }
            return Ok(());
        };

        let identifier = bundle.identifier().unwrap_or_default();
        let child_scope = scope.nested(&id, EntityType::DocumentaryUnit, identifier);
        for child in children {
            let child_location = format!("{}, item {}", location, child.identifier().unwrap_or("?"));
            self.import_unit(ctx, child, &child_scope, &child_location)?;
        }
        Ok(())
    }
}

impl Importer for UnitImporter {
    fn import_item(&mut self, ctx: &mut ImportContext<'_>, item: ImportItem) -> Result<(), ImportError> {
        let bundle = flatten_single_valued(item.bundle);
        if bundle.entity_type() != EntityType::DocumentaryUnit {
            let err = ImportError::Parse(format!("expected a DocumentaryUnit, got {}", bundle.entity_type()));
            return Err(err.at(ctx.location()));
        }
        let scope = ctx.scope().clone();
        let location = ctx.location();
        self.import_unit(ctx, bundle, &scope, &location)
    }
}

/// Imports flat authority families: agents into an authoritative set,
/// repositories into a country
#[derive(Debug, Default)]
pub struct AuthorityImporter;

impl AuthorityImporter {
    pub fn new() -> Self {
        Self
    }
}

impl Importer for AuthorityImporter {
    fn import_item(&mut self, ctx: &mut ImportContext<'_>, item: ImportItem) -> Result<(), ImportError> {
        let bundle = flatten_single_valued(item.bundle);
        let location = ctx.location();
        import_flat(ctx, &bundle, &location)?;
        Ok(())
    }
}

/// A `broader` or `related` reference waiting for its target
#[derive(Debug, Clone)]
struct PendingLink {
    from: String,
    label: &'static str,
    target: String,
    location: String,
}

/// Imports vocabulary concepts and links them once all exist
#[derive(Debug, Default)]
pub struct ConceptImporter {
    pending: Vec<PendingLink>,
}

impl ConceptImporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Importer for ConceptImporter {
    fn import_item(&mut self, ctx: &mut ImportContext<'_>, item: ImportItem) -> Result<(), ImportError> {
        let bundle = flatten_single_valued(item.bundle);
        let location = ctx.location();
        let Some(id) = import_flat(ctx, &bundle, &location)? else {
            return Ok(());
        };

        for label in [BROADER, RELATED] {
            let targets = bundle.meta_value(label).map(|v| v.texts()).unwrap_or_default();
            for target in targets {
                self.pending.push(PendingLink {
                    from: id.clone(),
                    label,
                    target,
                    location: location.clone(),
                });
            }
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &mut ImportContext<'_>) -> Result<(), ImportError> {
        let scope = ctx.scope().clone();
        for link in std::mem::take(&mut self.pending) {
            let target = identifier::generate(scope.id_path(), &link.target)
                .map_err(|e| ImportError::from(PersistError::from(e)).at(link.location.as_str()))?;
            if target == link.from {
                warn!(concept = %link.from, label = link.label, "Ignoring reference to itself");
                continue;
            }
            if !ctx.graph().contains(&target) {
                let err = ImportError::Integrity(format!(
                    "{} target '{}' of '{}' does not exist",
                    link.label, target, link.from
                ));
                return Err(err.at(link.location));
            }
            if ctx.link(&link.from, link.label, &target)? {
                debug!(from = %link.from, label = link.label, to = %target, "Linked concepts");
            }
        }
        Ok(())
    }
}

/// Persists arbitrary bundles under the scope
#[derive(Debug, Default)]
pub struct BundleImporter;

impl BundleImporter {
    pub fn new() -> Self {
        Self
    }
}

impl Importer for BundleImporter {
    fn import_item(&mut self, ctx: &mut ImportContext<'_>, item: ImportItem) -> Result<(), ImportError> {
        let bundle = flatten_single_valued(item.bundle);
        let location = ctx.location();
        import_flat(ctx, &bundle, &location)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{EadHandler, ImportManager, ImportOptions, PropertyMap, SkosHandler};
    use crate::persistence::{Actor, BundleDao};
    use crate::storage::{GraphRead, GraphStore, MemoryGraph};

    fn graph_with(scopes: &[Bundle]) -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        {
            let mut txn = graph.begin().unwrap();
            let dao = BundleDao::new();
            for scope in scopes {
                dao.persist(txn.as_mut(), scope, &Scope::system(), &Actor::system())
                    .unwrap();
            }
            txn.commit().unwrap();
        }
        graph
    }

    const FINDING_AID: &str = r#"<ead><archdesc level="fonds">
        <did><unitid>p1</unitid><unittitle>Papers</unittitle></did>
        <dsc><c01><did><unitid>c1</unitid><unittitle>Letters</unittitle></did></c01></dsc>
    </archdesc></ead>"#;

    #[test]
    fn test_units_are_linked_into_the_hierarchy() {
        let repository = Bundle::new(EntityType::Repository).with_data_value("identifier", "repoa");
        let mut graph = graph_with(&[repository]);
        let log = ImportManager::new(&mut graph)
            .with_scope("repoa")
            .import_reader(
                &mut EadHandler::new(PropertyMap::ead(), "eng"),
                &mut UnitImporter::new(),
                "fonds.xml",
                &mut FINDING_AID.as_bytes(),
            )
            .unwrap();

        assert_eq!(log.created_ids(), ["repoa-p1", "repoa-p1-c1"]);
        assert!(graph.has_edge("repoa-p1", HELD_BY, "repoa"));
        assert!(graph.has_edge("repoa-p1", HAS_PERMISSION_SCOPE, "repoa"));
        assert!(graph.has_edge("repoa-p1-c1", CHILD_OF, "repoa-p1"));
        assert!(graph.has_edge("repoa-p1-c1", HAS_PERMISSION_SCOPE, "repoa-p1"));
        assert!(!graph.has_edge("repoa-p1-c1", HELD_BY, "repoa"));
    }

    #[test]
    fn test_tolerant_run_skips_invalid_unit_and_its_children() {
        let repository = Bundle::new(EntityType::Repository).with_data_value("identifier", "repoa");
        let mut graph = graph_with(&[repository]);
        let xml = r#"<ead><archdesc level="nonsense"><did><unitid>p1</unitid></did>
            <dsc><c01><did><unitid>c1</unitid></did></c01></dsc></archdesc></ead>"#;
        let log = ImportManager::new(&mut graph)
            .with_scope("repoa")
            .with_options(ImportOptions::new().tolerant(true))
            .import_reader(
                &mut EadHandler::new(PropertyMap::ead(), "eng"),
                &mut UnitImporter::new(),
                "bad.xml",
                &mut xml.as_bytes(),
            )
            .unwrap();
        assert_eq!(log.error_count(), 1);
        assert!(log.errors().contains_key("bad.xml, record 1"));
        assert!(!graph.contains("repoa-p1"));
        assert!(!graph.contains("repoa-p1-c1"));
    }

    #[test]
    fn test_agents_join_their_authoritative_set() {
        let set = Bundle::new(EntityType::AuthoritativeSet).with_data_value("identifier", "people");
        let mut graph = graph_with(&[set]);
        let agent = r#"{"type": "HistoricalAgent", "data": {"identifier": "a1"}, "relationships": {"describes": [{"type": "HistoricalAgentDescription", "data": {"name": "Anne Frank", "languageCode": "eng", "typeOfEntity": "person"}}]}}"#;
        ImportManager::new(&mut graph)
            .with_scope("people")
            .import_reader(
                &mut crate::import::JsonLinesHandler::new(),
                &mut AuthorityImporter::new(),
                "agents.jsonl",
                &mut agent.as_bytes(),
            )
            .unwrap();
        assert!(graph.has_edge("people-a1", IN_AUTHORITATIVE_SET, "people"));
    }

    const VOCABULARY: &str = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
             xmlns:skos="http://www.w3.org/2004/02/skos/core#">
      <skos:Concept rdf:about="http://example.org/terms/camps">
        <skos:prefLabel xml:lang="eng">Camps</skos:prefLabel>
        <skos:broader rdf:resource="http://example.org/terms/places"/>
        <skos:related rdf:resource="http://example.org/terms/camps"/>
      </skos:Concept>
      <skos:Concept rdf:about="http://example.org/terms/places">
        <skos:prefLabel xml:lang="eng">Places</skos:prefLabel>
      </skos:Concept>
    </rdf:RDF>"#;

    #[test]
    fn test_concept_references_resolve_after_all_records() {
        let vocabulary = Bundle::new(EntityType::Vocabulary).with_data_value("identifier", "terms");
        let mut graph = graph_with(&[vocabulary]);
        ImportManager::new(&mut graph)
            .with_scope("terms")
            .import_reader(
                &mut SkosHandler::new("eng"),
                &mut ConceptImporter::new(),
                "terms.rdf",
                &mut VOCABULARY.as_bytes(),
            )
            .unwrap();
        assert!(graph.has_edge("terms-camps", BROADER, "terms-places"));
        assert!(graph.has_edge("terms-places", IN_AUTHORITATIVE_SET, "terms"));
        assert!(!graph.has_edge("terms-camps", RELATED, "terms-camps"));
    }

    #[test]
    fn test_missing_concept_target_aborts() {
        let vocabulary = Bundle::new(EntityType::Vocabulary).with_data_value("identifier", "terms");
        let mut graph = graph_with(&[vocabulary]);
        let only_camps = VOCABULARY.replace("http://example.org/terms/places\"/>", "http://example.org/terms/regions\"/>");
        let err = ImportManager::new(&mut graph)
            .with_scope("terms")
            .with_options(ImportOptions::new().tolerant(true))
            .import_reader(
                &mut SkosHandler::new("eng"),
                &mut ConceptImporter::new(),
                "terms.rdf",
                &mut only_camps.as_bytes(),
            )
            .unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("terms-regions"));
        assert!(!graph.contains("terms-camps"));
    }
}
