//! Shaping flat source records into bundle trees
//!
//! XML and table handlers gather a record's values into a [`RawRecord`]
//! keyed by field name. [`RecordShaper`] then splits it into the entity
//! bundle and its description:
//! - `identifier`: the first value identifies the entity, further values
//!   become `otherIdentifiers`
//! - fields ending in `Access` become access points typed by their prefix
//! - `startDate`/`endDate` become a date period
//! - everything else describes the entity in one language

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::properties::{PathMapping, PropertyMap};
use super::{ImportError, CHILD_ITEM};
use crate::models::entity_type::{
    DESCRIBES, HAS_ACCESS_POINT, HAS_DATE, HAS_MAINTENANCE_EVENT, IDENTIFIER_KEY, LANGUAGE_KEY,
    NAME_KEY, OTHER_IDENTIFIERS_KEY,
};
use crate::models::{Bundle, DataMap, DataValue, EntityType, Scalar};

pub const START_DATE: &str = "startDate";
pub const END_DATE: &str = "endDate";
pub const ACCESS_SUFFIX: &str = "Access";

static SINGLE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{4}(?:-\d{2}(?:-\d{2})?)?)\s*$").unwrap());
static DATE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{4}(?:-\d{2}(?:-\d{2})?)?)\s*(?:-|/|–|to)\s*(\d{4}(?:-\d{2}(?:-\d{2})?)?)\s*$")
        .unwrap()
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Values gathered for one source record
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    data: DataMap,
    dates: Vec<Bundle>,
    events: Vec<Bundle>,
    children: Vec<Bundle>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under `key`; repeated keys collect into a list.
    ///
    /// Runs of whitespace collapse to one space and blank values are
    /// dropped.
    pub fn push(&mut self, key: &str, value: &str) {
        let value = WHITESPACE.replace_all(value.trim(), " ").to_string();
        if value.is_empty() {
            return;
        }
        let merged = match self.data.remove(key) {
            None => DataValue::from(value),
            Some(DataValue::Scalar(existing)) => {
                DataValue::List(vec![existing, Scalar::from(value)])
            }
            Some(DataValue::List(mut items)) => {
                items.push(Scalar::from(value));
                DataValue::List(items)
            }
        };
        self.data.insert(key.to_string(), merged);
    }

    /// Replace whatever `key` holds.
    pub fn set(&mut self, key: &str, value: impl Into<DataValue>) {
        self.data.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.data.get(key)
    }

    pub fn first(&self, key: &str) -> Option<String> {
        self.data.get(key).and_then(DataValue::first_text)
    }

    pub fn add_date(&mut self, date: Bundle) {
        self.dates.push(date);
    }

    pub fn add_maintenance_event(&mut self, event: Bundle) {
        self.events.push(event);
    }

    pub fn add_child(&mut self, child: Bundle) {
        self.children.push(child);
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.dates.is_empty() && self.events.is_empty() && self.children.is_empty()
    }
}

/// Open element path below a record element, with the text gathered for
/// each open element
#[derive(Debug, Clone, Default)]
pub struct ElementPath {
    names: Vec<String>,
    texts: Vec<String>,
}

impl ElementPath {
    pub fn open(&mut self, name: &str) {
        self.names.push(name.to_string());
        self.texts.push(String::new());
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn append_text(&mut self, text: &str) {
        if let Some(buffer) = self.texts.last_mut() {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(text);
        }
    }

    /// Close the innermost element and store its text under the field the
    /// path maps to. Returns the element name and its raw text.
    ///
    /// Inline markup inside running text whose field is only inherited from
    /// the parent goes back into the parent's text instead.
    pub fn close(&mut self, properties: &PropertyMap, record: &mut RawRecord) -> Option<(String, String)> {
        let text = self.texts.pop()?;
        let mapping = properties.lookup_path(&self.names);
        let parent = match self.names.len() {
            0 | 1 => None,
            n => Some(properties.lookup_path(&self.names[..n - 1])),
        };
        let name = self.names.pop()?;

        let trimmed = text.trim();
        let mixed = self.texts.last().is_some_and(|b| !b.trim().is_empty());
        if !trimmed.is_empty() {
            match mapping {
                ref inherited if mixed && parent.as_ref() == Some(inherited) => {
                    self.append_text(trimmed);
                }
                PathMapping::Field(field) => record.push(field, trimmed),
                PathMapping::Ignored => {}
                PathMapping::Unknown(key) => {
                    debug!(key = %key, "Unmapped element");
                    record.push(&key, trimmed);
                }
            }
        }
        Some((name, text))
    }
}

/// Date period for a date expression.
///
/// `normal` is an ISO form such as `1939/1945`; without it the text itself
/// is parsed. Returns `None` when no start date can be found.
pub fn date_period(text: &str, normal: Option<&str>, kind: &str) -> Option<Bundle> {
    let source = normal.filter(|n| !n.trim().is_empty()).unwrap_or(text);
    let (start, end) = if let Some(caps) = DATE_RANGE.captures(source) {
        (caps[1].to_string(), Some(caps[2].to_string()))
    } else if let Some(caps) = SINGLE_DATE.captures(source) {
        (caps[1].to_string(), None)
    } else {
        debug!(text, "No date period for unparseable date");
        return None;
    };

    let mut date = Bundle::new(EntityType::DatePeriod)
        .with_data_value(START_DATE, start)
        .with_data_value("type", kind);
    if let Some(end) = end {
        date = date.with_data_value(END_DATE, end);
    }
    let text = text.trim();
    if !text.is_empty() {
        date = date.with_data_value("description", text);
    }
    Some(date)
}

/// Type of an access point field such as `personAccess`.
fn access_point_type(field: &str) -> &'static str {
    match field.trim_end_matches(ACCESS_SUFFIX) {
        "subject" => "subject",
        "creator" => "creator",
        "person" => "person",
        "family" => "family",
        "corporateBody" => "corporateBody",
        "place" => "place",
        "genre" => "genre",
        _ => "other",
    }
}

/// Splits raw records into an entity with one description
#[derive(Debug, Clone)]
pub struct RecordShaper {
    entity_type: EntityType,
    description_type: EntityType,
    default_language: String,
}

impl RecordShaper {
    pub fn new(entity_type: EntityType, default_language: impl Into<String>) -> Result<Self, ImportError> {
        let description_type = entity_type
            .schema()
            .dependent(DESCRIBES)
            .map(|d| d.child)
            .ok_or_else(|| {
                ImportError::Config(format!("{} records have no description", entity_type))
            })?;
        Ok(Self {
            entity_type,
            description_type,
            default_language: default_language.into(),
        })
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn description_type(&self) -> EntityType {
        self.description_type
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Whether `field` takes several values on the entity or description.
    pub fn is_multivalued(&self, field: &str) -> bool {
        field.ends_with(ACCESS_SUFFIX)
            || field == IDENTIFIER_KEY
            || self.entity_type.schema().is_multivalued(field)
            || self.description_type.schema().is_multivalued(field)
    }

    fn date_kind(&self) -> &'static str {
        match self.description_type {
            EntityType::HistoricalAgentDescription => "existence",
            _ => "creation",
        }
    }

    pub fn shape(&self, record: RawRecord) -> Bundle {
        let RawRecord {
            mut data,
            mut dates,
            events,
            children,
        } = record;

        let mut entity = Bundle::new(self.entity_type);
        let mut other_ids: Vec<Scalar> = data
            .remove(OTHER_IDENTIFIERS_KEY)
            .map(|v| v.texts().into_iter().map(Scalar::from).collect())
            .unwrap_or_default();
        let identifier = match data.remove(IDENTIFIER_KEY) {
            Some(DataValue::List(mut ids)) if !ids.is_empty() => {
                let first = ids.remove(0);
                ids.append(&mut other_ids);
                other_ids = ids;
                Some(first.to_string())
            }
            Some(value) => value.first_text(),
            None => None,
        };
        if let Some(identifier) = &identifier {
            entity = entity.with_data_value(IDENTIFIER_KEY, identifier.as_str());
        }
        if !other_ids.is_empty() {
            if self.entity_type.schema().is_multivalued(OTHER_IDENTIFIERS_KEY) {
                entity = entity.with_data_value(OTHER_IDENTIFIERS_KEY, DataValue::List(other_ids));
            } else {
                debug!(entity_type = %self.entity_type, "Dropping other identifiers");
            }
        }

        if !data.contains_key(NAME_KEY) {
            if let Some(identifier) = &identifier {
                data.insert(NAME_KEY.to_string(), DataValue::from(identifier.as_str()));
            }
        }
        if let Some(DataValue::List(names)) = data.get(NAME_KEY)
            && !names.is_empty()
        {
            let mut names = names.clone();
            let first = names.remove(0);
            let schema = self.description_type.schema();
            let alternative = ["otherFormsOfName", "parallelFormsOfName"]
                .into_iter()
                .find(|f| schema.is_multivalued(f));
            match alternative {
                Some(field) if !names.is_empty() => {
                    let mut others = data.remove(field).map(|v| v.texts()).unwrap_or_default();
                    others.extend(names.iter().map(|s| s.to_string()));
                    data.insert(field.to_string(), DataValue::from(others));
                }
                _ => {}
            }
            data.insert(NAME_KEY.to_string(), DataValue::Scalar(first));
        }
        if !data.contains_key(LANGUAGE_KEY) {
            data.insert(LANGUAGE_KEY.to_string(), DataValue::from(self.default_language.as_str()));
        }

        if let Some(start) = data.remove(START_DATE).and_then(|v| v.first_text()) {
            let end = data.remove(END_DATE).and_then(|v| v.first_text());
            let normal = match &end {
                Some(end) => format!("{}/{}", start, end),
                None => start.clone(),
            };
            dates.extend(date_period("", Some(&normal), self.date_kind()));
        }

        let access_fields: Vec<String> = data
            .keys()
            .filter(|k| k.ends_with(ACCESS_SUFFIX) && k.len() > ACCESS_SUFFIX.len())
            .cloned()
            .collect();
        let mut access_points = Vec::new();
        for field in access_fields {
            let kind = access_point_type(&field);
            for name in data.remove(&field).map(|v| v.texts()).unwrap_or_default() {
                access_points.push(
                    Bundle::new(EntityType::AccessPoint)
                        .with_data_value(NAME_KEY, name)
                        .with_data_value("type", kind),
                );
            }
        }

        let description = Bundle::with_initial_data(self.description_type, data)
            .with_relations(HAS_DATE, dates)
            .with_relations(HAS_ACCESS_POINT, access_points)
            .with_relations(HAS_MAINTENANCE_EVENT, events);
        entity
            .with_relation(DESCRIBES, description)
            .with_relations(CHILD_ITEM, children)
    }
}
