//! Synchronising a scope with a re-imported finding aid
//!
//! A sync run is an ordinary ingest followed by a cleanup inside the same
//! transaction: units that were in scope before the run but were not seen
//! by it are deleted, each leaving a version behind. A unit whose local
//! identifier reappears under a different parent is reported as moved.
//!
//! Local identifiers must be unique within the synced scope.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info};

use super::manager::{RunHook, Source};
use super::{ImportContext, ImportError, ImportLog, ImportManager, Importer, StreamHandler};
use crate::models::EntityType;
use crate::models::entity_type::IDENTIFIER_KEY;
use crate::persistence::scope::HAS_PERMISSION_SCOPE;
use crate::persistence::{Actor, BundleDao, EventContext, EventType};
use crate::storage::GraphRead;

/// Outcome of a sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLog {
    log: ImportLog,
    created_ids: Vec<String>,
    deleted_ids: Vec<String>,
    /// Old id to new id of units that changed parent
    moved: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deletion_event_id: Option<String>,
}

impl SyncLog {
    /// Log of the ingest part of the run.
    pub fn log(&self) -> &ImportLog {
        &self.log
    }

    /// Units that are new to the scope, excluding move targets.
    pub fn created_ids(&self) -> &[String] {
        &self.created_ids
    }

    /// Units that left the scope, excluding move sources.
    pub fn deleted_ids(&self) -> &[String] {
        &self.deleted_ids
    }

    pub fn moved(&self) -> &BTreeMap<String, String> {
        &self.moved
    }

    pub fn deletion_event_id(&self) -> Option<&str> {
        self.deletion_event_id.as_deref()
    }
}

/// A unit found in the synced scope
#[derive(Debug, Clone)]
struct ScopedUnit {
    local_id: String,
    depth: usize,
}

/// Cleanup state carried through a sync run
struct SyncHook {
    excludes: HashSet<String>,
    actor: Actor,
    message: Option<String>,
    before: BTreeMap<String, ScopedUnit>,
}

struct SyncOutcome {
    created_ids: Vec<String>,
    deleted_ids: Vec<String>,
    moved: BTreeMap<String, String>,
    deletion_event_id: Option<String>,
}

/// Units at and beneath the scope, keyed by graph id.
fn units_in_scope<G: GraphRead + ?Sized>(graph: &G, scope_id: &str, include_scope: bool) -> BTreeMap<String, ScopedUnit> {
    let mut units = BTreeMap::new();
    let mut queue = vec![(scope_id.to_string(), 0)];
    let mut visited = HashSet::new();
    while let Some((id, depth)) = queue.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(vertex) = graph.vertex(&id)
            && vertex.entity_type == EntityType::DocumentaryUnit
            && (depth > 0 || include_scope)
        {
            let local_id = vertex
                .properties
                .get(IDENTIFIER_KEY)
                .and_then(|v| v.first_text())
                .unwrap_or_default();
            units.insert(id.clone(), ScopedUnit { local_id, depth });
        }
        for child in graph.in_edges(&id, HAS_PERMISSION_SCOPE) {
            queue.push((child, depth + 1));
        }
    }
    units
}

impl SyncHook {
    fn scope_units(ctx: &ImportContext<'_>) -> Result<BTreeMap<String, ScopedUnit>, ImportError> {
        let scope = ctx.scope();
        let Some(scope_id) = scope.id() else {
            return Err(ImportError::Config("sync needs a scope".to_string()));
        };
        let include_scope = match scope.entity_type() {
            Some(EntityType::Repository) => false,
            Some(EntityType::DocumentaryUnit) => true,
            other => {
                return Err(ImportError::Config(format!(
                    "sync scope must be a repository or a documentary unit, not {}",
                    other.map(|t| t.to_string()).unwrap_or_default()
                )));
            }
        };
        Ok(units_in_scope(ctx.graph(), scope_id, include_scope))
    }

    /// Pair each old unit with the new unit that took over its local id.
    fn find_moved(&self, after: &BTreeMap<String, ScopedUnit>) -> Result<BTreeMap<String, String>, ImportError> {
        let mut by_local: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, unit) in after {
            by_local.entry(unit.local_id.as_str()).or_default().push(id.as_str());
        }

        let mut moved = BTreeMap::new();
        for (local_id, ids) in by_local {
            match ids.as_slice() {
                [_] => {}
                [first, second] => {
                    let (old, new) = if self.before.contains_key(*first) {
                        (first, second)
                    } else if self.before.contains_key(*second) {
                        (second, first)
                    } else {
                        return Err(ImportError::Integrity(format!(
                            "moved unit '{}' was not in scope before the sync",
                            local_id
                        )));
                    };
                    moved.insert(old.to_string(), new.to_string());
                }
                _ => {
                    return Err(ImportError::Integrity(format!(
                        "local identifier '{}' is used by {} units after the sync",
                        local_id,
                        ids.len()
                    )));
                }
            }
        }
        Ok(moved)
    }
}

impl RunHook for SyncHook {
    type Output = SyncOutcome;

    fn before_ingest(&mut self, ctx: &mut ImportContext<'_>) -> Result<(), ImportError> {
        let mut units = Self::scope_units(ctx)?;
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (id, unit) in &units {
            if let Some(other) = seen.insert(unit.local_id.as_str(), id.as_str()) {
                return Err(ImportError::Integrity(format!(
                    "local identifier '{}' is not unique in scope ('{}' and '{}')",
                    unit.local_id, other, id
                )));
            }
        }
        units.retain(|id, _| !self.excludes.contains(id));
        debug!(units = units.len(), excluded = self.excludes.len(), "Units in scope before sync");
        self.before = units;
        Ok(())
    }

    fn after_ingest(&mut self, ctx: &mut ImportContext<'_>) -> Result<SyncOutcome, ImportError> {
        let after = Self::scope_units(ctx)?;
        let moved = self.find_moved(&after)?;

        let touched: BTreeSet<&str> = after
            .keys()
            .filter(|id| ctx.log().has_seen(id))
            .map(String::as_str)
            .collect();
        let move_targets: HashSet<&str> = moved.values().map(String::as_str).collect();
        let created_ids: Vec<String> = touched
            .iter()
            .filter(|id| !self.before.contains_key(**id) && !move_targets.contains(**id))
            .map(|id| id.to_string())
            .collect();

        let mut doomed: Vec<(&String, &ScopedUnit)> = self
            .before
            .iter()
            .filter(|(id, _)| !touched.contains(id.as_str()))
            .collect();
        doomed.sort_by(|a, b| b.1.depth.cmp(&a.1.depth).then_with(|| a.0.cmp(b.0)));

        let dao = BundleDao::new();
        let mut event = EventContext::new(self.actor.clone(), EventType::Deletion, self.message.clone());
        let mut deleted_ids = Vec::new();
        for (id, _) in &doomed {
            let version = dao.delete_versioned(ctx.txn(), id, &self.actor)?;
            event.add_version(&version);
            if !moved.contains_key(*id) {
                deleted_ids.push(id.to_string());
            }
        }
        deleted_ids.sort();

        let deletion_event_id = if doomed.is_empty() {
            None
        } else {
            Some(event.commit(ctx.txn())?)
        };
        info!(
            created = created_ids.len(),
            deleted = deleted_ids.len(),
            moved = moved.len(),
            "Sync cleanup finished"
        );
        Ok(SyncOutcome {
            created_ids,
            deleted_ids,
            moved,
            deletion_event_id,
        })
    }
}

impl ImportManager<'_> {
    /// Re-import one stream into the scope and delete the units it no
    /// longer contains. Ids in `excludes` are never deleted.
    pub fn sync_reader(
        &mut self,
        handler: &mut dyn StreamHandler,
        importer: &mut dyn Importer,
        source: &str,
        input: &mut dyn BufRead,
        excludes: &HashSet<String>,
    ) -> Result<SyncLog, ImportError> {
        let sources = vec![Source::Reader {
            name: source.to_string(),
            input,
        }];
        self.sync(handler, importer, sources, excludes)
    }

    /// Sync several files in one transaction.
    pub fn sync_files<P: AsRef<Path>>(
        &mut self,
        handler: &mut dyn StreamHandler,
        importer: &mut dyn Importer,
        paths: &[P],
        excludes: &HashSet<String>,
    ) -> Result<SyncLog, ImportError> {
        let sources = paths
            .iter()
            .map(|p| Source::File(p.as_ref().to_path_buf()))
            .collect();
        self.sync(handler, importer, sources, excludes)
    }

    fn sync(
        &mut self,
        handler: &mut dyn StreamHandler,
        importer: &mut dyn Importer,
        sources: Vec<Source<'_>>,
        excludes: &HashSet<String>,
    ) -> Result<SyncLog, ImportError> {
        if self.scope_id().is_none() {
            return Err(ImportError::Config("sync needs a scope".to_string()));
        }
        let mut hook = SyncHook {
            excludes: excludes.clone(),
            actor: self.actor().clone(),
            message: self.options().message.clone(),
            before: BTreeMap::new(),
        };
        let (log, outcome) = self.run(handler, importer, sources, &mut hook)?;
        Ok(SyncLog {
            log,
            created_ids: outcome.created_ids,
            deleted_ids: outcome.deleted_ids,
            moved: outcome.moved,
            deletion_event_id: outcome.deletion_event_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{EadHandler, ImportOptions, PropertyMap, UnitImporter};
    use crate::models::Bundle;
    use crate::persistence::Scope;
    use crate::persistence::dao::LIFECYCLE_VERSION;
    use crate::persistence::events::HAS_VERSION;
    use crate::storage::{GraphStore, MemoryGraph};

    const FINDING_AID: &str = r#"<ead><archdesc level="fonds">
        <did><unitid>p1</unitid><unittitle>Papers</unittitle></did>
        <dsc>
          <c01><did><unitid>c1</unitid><unittitle>Letters</unittitle></did></c01>
          <c01><did><unitid>c2</unitid><unittitle>Diaries</unittitle></did>
            <c02><did><unitid>f1</unitid><unittitle>Folder</unittitle></did></c02>
          </c01>
        </dsc>
    </archdesc></ead>"#;

    fn repository_graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        {
            let mut txn = graph.begin().unwrap();
            let repository = Bundle::new(EntityType::Repository).with_data_value("identifier", "repoa");
            BundleDao::new()
                .persist(txn.as_mut(), &repository, &Scope::system(), &Actor::system())
                .unwrap();
            txn.commit().unwrap();
        }
        graph
    }

    fn sync(graph: &mut MemoryGraph, scope: &str, xml: &str, excludes: &[&str]) -> Result<SyncLog, ImportError> {
        let excludes: HashSet<String> = excludes.iter().map(|s| s.to_string()).collect();
        ImportManager::new(graph)
            .with_scope(scope)
            .with_options(ImportOptions::new().message("Sync"))
            .sync_reader(
                &mut EadHandler::new(PropertyMap::ead(), "eng"),
                &mut UnitImporter::new(),
                "fonds.xml",
                &mut xml.as_bytes(),
                &excludes,
            )
    }

    #[test]
    fn test_first_sync_only_creates() {
        let mut graph = repository_graph();
        let log = sync(&mut graph, "repoa", FINDING_AID, &[]).unwrap();
        assert_eq!(log.log().created(), 4);
        assert_eq!(log.created_ids().len(), 4);
        assert!(log.deleted_ids().is_empty());
        assert!(log.moved().is_empty());
        assert_eq!(log.deletion_event_id(), None);
    }

    #[test]
    fn test_vanished_units_are_deleted_with_versions() {
        let mut graph = repository_graph();
        sync(&mut graph, "repoa", FINDING_AID, &[]).unwrap();

        let without_c2 = FINDING_AID.replace(
            r#"<c01><did><unitid>c2</unitid><unittitle>Diaries</unittitle></did>
            <c02><did><unitid>f1</unitid><unittitle>Folder</unittitle></did></c02>
          </c01>"#,
            "",
        );
        let log = sync(&mut graph, "repoa", &without_c2, &[]).unwrap();
        assert_eq!(log.log().unchanged(), 2);
        assert_eq!(log.deleted_ids(), ["repoa-p1-c2", "repoa-p1-c2-f1"]);
        assert!(!graph.contains("repoa-p1-c2"));
        assert!(!graph.contains("repoa-p1-c2-f1"));
        assert!(!graph.contains("repoa-p1-c2.eng"));
        assert!(graph.contains("repoa-p1-c1"));

        let event = log.deletion_event_id().unwrap();
        let versions = graph.out_edges(event, HAS_VERSION);
        assert_eq!(versions.len(), 2);
        assert_eq!(
            graph.vertex(&versions[0]).unwrap().properties.get("itemId"),
            Some(&crate::models::DataValue::from("repoa-p1-c2-f1"))
        );
        assert!(log.log().event_id().is_none());
    }

    #[test]
    fn test_moved_unit_is_reported_not_deleted() {
        let mut graph = repository_graph();
        sync(&mut graph, "repoa", FINDING_AID, &[]).unwrap();

        let f1_moved = FINDING_AID
            .replace(
                r#"<c02><did><unitid>f1</unitid><unittitle>Folder</unittitle></did></c02>"#,
                "",
            )
            .replace(
                r#"<unittitle>Letters</unittitle></did></c01>"#,
                r#"<unittitle>Letters</unittitle></did>
                <c02><did><unitid>f1</unitid><unittitle>Folder</unittitle></did></c02></c01>"#,
            );
        let log = sync(&mut graph, "repoa", &f1_moved, &[]).unwrap();
        assert_eq!(
            log.moved().get("repoa-p1-c2-f1").map(String::as_str),
            Some("repoa-p1-c1-f1")
        );
        assert!(log.created_ids().is_empty());
        assert!(log.deleted_ids().is_empty());
        assert!(graph.contains("repoa-p1-c1-f1"));
        assert!(!graph.contains("repoa-p1-c2-f1"));
        assert!(log.deletion_event_id().is_some());
    }

    #[test]
    fn test_excluded_units_survive() {
        let mut graph = repository_graph();
        sync(&mut graph, "repoa", FINDING_AID, &[]).unwrap();
        let other = r#"<ead><archdesc level="fonds"><did><unitid>p2</unitid><unittitle>Photos</unittitle></did></archdesc></ead>"#;
        let log = sync(
            &mut graph,
            "repoa",
            other,
            &["repoa-p1", "repoa-p1-c1", "repoa-p1-c2", "repoa-p1-c2-f1"],
        )
        .unwrap();
        assert_eq!(log.created_ids(), ["repoa-p2"]);
        assert!(log.deleted_ids().is_empty());
        assert!(graph.contains("repoa-p1-c2-f1"));
    }

    #[test]
    fn test_unit_scope_includes_itself() {
        let mut graph = repository_graph();
        sync(&mut graph, "repoa", FINDING_AID, &[]).unwrap();
        let units = units_in_scope(&graph, "repoa-p1-c2", true);
        assert_eq!(units.keys().collect::<Vec<_>>(), ["repoa-p1-c2", "repoa-p1-c2-f1"]);
        assert_eq!(units["repoa-p1-c2-f1"].depth, 1);
        assert!(units_in_scope(&graph, "repoa", false).get("repoa").is_none());
    }

    #[test]
    fn test_sync_needs_a_unit_holding_scope() {
        let mut graph = repository_graph();
        let err = ImportManager::new(&mut graph)
            .sync_reader(
                &mut EadHandler::new(PropertyMap::ead(), "eng"),
                &mut UnitImporter::new(),
                "fonds.xml",
                &mut FINDING_AID.as_bytes(),
                &HashSet::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));

        let country = Bundle::new(EntityType::Country).with_data_value("identifier", "nl");
        {
            let mut txn = graph.begin().unwrap();
            BundleDao::new()
                .persist(txn.as_mut(), &country, &Scope::system(), &Actor::system())
                .unwrap();
            txn.commit().unwrap();
        }
        assert!(matches!(
            sync(&mut graph, "nl", FINDING_AID, &[]),
            Err(ImportError::Config(_))
        ));
        assert!(!graph.contains("nl-p1"));
    }

    #[test]
    fn test_failed_sync_deletes_nothing() {
        let mut graph = repository_graph();
        sync(&mut graph, "repoa", FINDING_AID, &[]).unwrap();
        let broken = r#"<ead><archdesc level="nonsense"><did><unitid>p9</unitid></did></archdesc></ead>"#;
        assert!(sync(&mut graph, "repoa", broken, &[]).is_err());
        assert!(graph.contains("repoa-p1-c2-f1"));
        assert!(graph.out_edges("repoa-p1", LIFECYCLE_VERSION).is_empty());
    }
}
