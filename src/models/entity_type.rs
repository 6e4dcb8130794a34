//! Entity types and their schemas

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data key holding an entity's local identifier.
pub const IDENTIFIER_KEY: &str = "identifier";
/// Data key holding a display name.
pub const NAME_KEY: &str = "name";
/// Data key holding a description's language.
pub const LANGUAGE_KEY: &str = "languageCode";
/// Data key for secondary identifiers.
pub const OTHER_IDENTIFIERS_KEY: &str = "otherIdentifiers";

/// Vertex property holding the generated id.
pub const ID_PROPERTY: &str = "__id";
/// Vertex property holding the type tag.
pub const TYPE_PROPERTY: &str = "__type";
/// Prefix of managed keys ignored in comparisons.
pub const MANAGED_PREFIX: &str = "_";

pub const RESERVED_KEYS: &[&str] = &[ID_PROPERTY, TYPE_PROPERTY];

/// Relation label from an entity to its descriptions.
pub const DESCRIBES: &str = "describes";
pub const HAS_DATE: &str = "hasDate";
pub const HAS_ACCESS_POINT: &str = "hasAccessPoint";
pub const HAS_MAINTENANCE_EVENT: &str = "hasMaintenanceEvent";

/// How a type's generated id is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// Scope chain plus the `identifier` field.
    Hierarchical,
    /// Parent id plus language code (and optional identifier).
    Description,
    /// Parent id plus a digest of the content.
    Content(&'static str),
    /// Assigned by the system (events, versions).
    System,
}

/// A dependent relation and the type its children must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependent {
    pub label: &'static str,
    pub child: EntityType,
}

/// Static validation schema for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct EntitySchema {
    pub mandatory: &'static [&'static str],
    pub enums: &'static [(&'static str, &'static [&'static str])],
    pub multivalued: &'static [&'static str],
    pub ordered: &'static [&'static str],
    pub dependents: &'static [Dependent],
    pub id_strategy: IdStrategy,
}

impl EntitySchema {
    pub fn is_multivalued(&self, key: &str) -> bool {
        self.multivalued.contains(&key) || key.starts_with(UNKNOWN_PREFIX)
    }

    pub fn is_ordered(&self, key: &str) -> bool {
        self.ordered.contains(&key)
    }

    pub fn allowed_values(&self, key: &str) -> Option<&'static [&'static str]> {
        self.enums
            .iter()
            .find(|(field, _)| *field == key)
            .map(|(_, values)| *values)
    }

    pub fn dependent(&self, label: &str) -> Option<&Dependent> {
        self.dependents.iter().find(|d| d.label == label)
    }
}

/// Prefix for source paths that have no field mapping.
pub const UNKNOWN_PREFIX: &str = "UNKNOWN_";

const LEVELS_OF_DESCRIPTION: &[&str] = &[
    "collection",
    "fonds",
    "subfonds",
    "series",
    "subseries",
    "recordgrp",
    "subgrp",
    "file",
    "item",
    "class",
    "otherlevel",
];
const ENTITY_KINDS: &[&str] = &["person", "family", "corporateBody"];
const DATE_TYPES: &[&str] = &["creation", "existence"];
const ACCESS_POINT_TYPES: &[&str] = &[
    "subject",
    "creator",
    "person",
    "family",
    "corporateBody",
    "place",
    "genre",
    "other",
];
const MAINTENANCE_TYPES: &[&str] = &["created", "revised", "updated", "deleted", "derived", "cancelled"];
const LINK_TYPES: &[&str] = &["associative", "hierarchical", "temporal", "family", "copy"];

/// Entity type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Country,
    Repository,
    RepositoryDescription,
    DocumentaryUnit,
    DocumentaryUnitDescription,
    HistoricalAgent,
    HistoricalAgentDescription,
    AuthoritativeSet,
    Vocabulary,
    Concept,
    ConceptDescription,
    DatePeriod,
    AccessPoint,
    MaintenanceEvent,
    Link,
    SystemEvent,
    Version,
    UserProfile,
}

impl EntityType {
    pub const ALL: &'static [EntityType] = &[
        EntityType::Country,
        EntityType::Repository,
        EntityType::RepositoryDescription,
        EntityType::DocumentaryUnit,
        EntityType::DocumentaryUnitDescription,
        EntityType::HistoricalAgent,
        EntityType::HistoricalAgentDescription,
        EntityType::AuthoritativeSet,
        EntityType::Vocabulary,
        EntityType::Concept,
        EntityType::ConceptDescription,
        EntityType::DatePeriod,
        EntityType::AccessPoint,
        EntityType::MaintenanceEvent,
        EntityType::Link,
        EntityType::SystemEvent,
        EntityType::Version,
        EntityType::UserProfile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Country => "Country",
            EntityType::Repository => "Repository",
            EntityType::RepositoryDescription => "RepositoryDescription",
            EntityType::DocumentaryUnit => "DocumentaryUnit",
            EntityType::DocumentaryUnitDescription => "DocumentaryUnitDescription",
            EntityType::HistoricalAgent => "HistoricalAgent",
            EntityType::HistoricalAgentDescription => "HistoricalAgentDescription",
            EntityType::AuthoritativeSet => "AuthoritativeSet",
            EntityType::Vocabulary => "Vocabulary",
            EntityType::Concept => "Concept",
            EntityType::ConceptDescription => "ConceptDescription",
            EntityType::DatePeriod => "DatePeriod",
            EntityType::AccessPoint => "AccessPoint",
            EntityType::MaintenanceEvent => "MaintenanceEvent",
            EntityType::Link => "Link",
            EntityType::SystemEvent => "SystemEvent",
            EntityType::Version => "Version",
            EntityType::UserProfile => "UserProfile",
        }
    }

    /// Schema used to validate bundles of this type.
    pub fn schema(&self) -> EntitySchema {
        use EntityType::*;
        const TOP_LEVEL: &[&str] = &[IDENTIFIER_KEY];
        const DESCRIPTION: &[&str] = &[NAME_KEY, LANGUAGE_KEY];
        const DESCRIPTION_DEPENDENTS: &[Dependent] = &[
            Dependent {
                label: HAS_DATE,
                child: DatePeriod,
            },
            Dependent {
                label: HAS_ACCESS_POINT,
                child: AccessPoint,
            },
            Dependent {
                label: HAS_MAINTENANCE_EVENT,
                child: MaintenanceEvent,
            },
        ];

        let base = EntitySchema {
            mandatory: &[],
            enums: &[],
            multivalued: &[],
            ordered: &[],
            dependents: &[],
            id_strategy: IdStrategy::Hierarchical,
        };

        match self {
            Country | AuthoritativeSet | Vocabulary => EntitySchema {
                mandatory: TOP_LEVEL,
                ..base
            },
            Repository => EntitySchema {
                mandatory: TOP_LEVEL,
                multivalued: &[OTHER_IDENTIFIERS_KEY],
                dependents: &[Dependent {
                    label: DESCRIBES,
                    child: RepositoryDescription,
                }],
                ..base
            },
            DocumentaryUnit => EntitySchema {
                mandatory: TOP_LEVEL,
                multivalued: &[OTHER_IDENTIFIERS_KEY],
                dependents: &[Dependent {
                    label: DESCRIBES,
                    child: DocumentaryUnitDescription,
                }],
                ..base
            },
            HistoricalAgent => EntitySchema {
                mandatory: TOP_LEVEL,
                multivalued: &[OTHER_IDENTIFIERS_KEY],
                dependents: &[Dependent {
                    label: DESCRIBES,
                    child: HistoricalAgentDescription,
                }],
                ..base
            },
            Concept => EntitySchema {
                mandatory: TOP_LEVEL,
                dependents: &[Dependent {
                    label: DESCRIBES,
                    child: ConceptDescription,
                }],
                ..base
            },
            RepositoryDescription => EntitySchema {
                mandatory: DESCRIPTION,
                multivalued: &["otherFormsOfName", "parallelFormsOfName"],
                dependents: &[Dependent {
                    label: HAS_MAINTENANCE_EVENT,
                    child: MaintenanceEvent,
                }],
                id_strategy: IdStrategy::Description,
                ..base
            },
            DocumentaryUnitDescription => EntitySchema {
                mandatory: DESCRIPTION,
                enums: &[("levelOfDescription", LEVELS_OF_DESCRIPTION)],
                multivalued: &[
                    "languageOfMaterial",
                    "scriptOfMaterial",
                    "notes",
                    "sources",
                    "parallelFormsOfName",
                ],
                ordered: &["notes"],
                dependents: DESCRIPTION_DEPENDENTS,
                id_strategy: IdStrategy::Description,
                ..base
            },
            HistoricalAgentDescription => EntitySchema {
                mandatory: &[NAME_KEY, LANGUAGE_KEY, "typeOfEntity"],
                enums: &[("typeOfEntity", ENTITY_KINDS)],
                multivalued: &["otherFormsOfName", "parallelFormsOfName", "sources"],
                dependents: DESCRIPTION_DEPENDENTS,
                id_strategy: IdStrategy::Description,
                ..base
            },
            ConceptDescription => EntitySchema {
                mandatory: DESCRIPTION,
                multivalued: &["altLabel", "definition", "scopeNote"],
                id_strategy: IdStrategy::Description,
                ..base
            },
            DatePeriod => EntitySchema {
                mandatory: &["startDate"],
                enums: &[("type", DATE_TYPES)],
                id_strategy: IdStrategy::Content("dateperiod"),
                ..base
            },
            AccessPoint => EntitySchema {
                mandatory: &[NAME_KEY, "type"],
                enums: &[("type", ACCESS_POINT_TYPES)],
                id_strategy: IdStrategy::Content("accesspoint"),
                ..base
            },
            MaintenanceEvent => EntitySchema {
                mandatory: &["eventType"],
                enums: &[("eventType", MAINTENANCE_TYPES)],
                id_strategy: IdStrategy::Content("maintenanceevent"),
                ..base
            },
            Link => EntitySchema {
                mandatory: &["type"],
                enums: &[("type", LINK_TYPES)],
                id_strategy: IdStrategy::Content("link"),
                ..base
            },
            UserProfile => EntitySchema {
                mandatory: &[IDENTIFIER_KEY, NAME_KEY],
                ..base
            },
            SystemEvent | Version => EntitySchema {
                id_strategy: IdStrategy::System,
                ..base
            },
        }
    }

    /// Whether entities of this type may own a scope.
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            EntityType::Country
                | EntityType::Repository
                | EntityType::DocumentaryUnit
                | EntityType::AuthoritativeSet
                | EntityType::Vocabulary
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| *c != '_' && *c != '-').collect();
        EntityType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(&wanted))
            .copied()
            .ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_from_str() {
        assert_eq!(
            "DocumentaryUnit".parse::<EntityType>().unwrap(),
            EntityType::DocumentaryUnit
        );
        assert_eq!(
            "documentary_unit".parse::<EntityType>().unwrap(),
            EntityType::DocumentaryUnit
        );
        assert_eq!(
            "date-period".parse::<EntityType>().unwrap(),
            EntityType::DatePeriod
        );
        assert!("widget".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_display_round_trips_every_type() {
        for t in EntityType::ALL {
            assert_eq!(t.to_string().parse::<EntityType>().unwrap(), *t);
        }
    }

    #[test]
    fn test_schema_dependents() {
        let schema = EntityType::DocumentaryUnit.schema();
        let describes = schema.dependent(DESCRIBES).unwrap();
        assert_eq!(describes.child, EntityType::DocumentaryUnitDescription);
        assert!(schema.dependent(HAS_DATE).is_none());

        let desc = EntityType::DocumentaryUnitDescription.schema();
        assert_eq!(desc.id_strategy, IdStrategy::Description);
        assert!(desc.dependent(HAS_ACCESS_POINT).is_some());
        assert!(desc.is_ordered("notes"));
        assert!(desc.is_multivalued("UNKNOWN_odd/path"));
        assert_eq!(
            EntityType::DatePeriod.schema().id_strategy,
            IdStrategy::Content("dateperiod")
        );
    }
}
