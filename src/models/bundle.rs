//! Bundle: the tree-shaped staging envelope for one entity
//!
//! A bundle carries an entity's type, optional generated id, its flat data
//! and named, ordered lists of nested child bundles. Builders consume and
//! return bundles, so a partially built bundle is never mutated in place.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::entity_type::{
    EntityType, IDENTIFIER_KEY, LANGUAGE_KEY, MANAGED_PREFIX, NAME_KEY,
};

/// A single property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Bool(_) => 0,
            Scalar::Int(_) => 1,
            Scalar::Float(_) => 2,
            Scalar::Text(_) => 3,
        }
    }

    /// Total order used to compare unordered lists.
    fn canonical_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// A data value: one scalar or a list of scalars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl DataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::Scalar(s) => s.as_str(),
            DataValue::List(_) => None,
        }
    }

    /// First scalar of the value, rendered as text.
    pub fn first_text(&self) -> Option<String> {
        match self {
            DataValue::Scalar(s) => Some(s.to_string()),
            DataValue::List(items) => items.first().map(|s| s.to_string()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, DataValue::List(_))
    }

    /// Blank text and empty lists carry no information.
    pub fn is_empty(&self) -> bool {
        match self {
            DataValue::Scalar(Scalar::Text(s)) => s.trim().is_empty(),
            DataValue::Scalar(_) => false,
            DataValue::List(items) => items.is_empty(),
        }
    }

    /// All scalars as text.
    pub fn texts(&self) -> Vec<String> {
        match self {
            DataValue::Scalar(s) => vec![s.to_string()],
            DataValue::List(items) => items.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Compare two values; lists ignore order unless `ordered`.
    pub fn same_as(&self, other: &DataValue, ordered: bool) -> bool {
        match (self, other) {
            (DataValue::List(a), DataValue::List(b)) if !ordered => {
                if a.len() != b.len() {
                    return false;
                }
                let mut a = a.clone();
                let mut b = b.clone();
                a.sort_by(Scalar::canonical_cmp);
                b.sort_by(Scalar::canonical_cmp);
                a == b
            }
            _ => self == other,
        }
    }

    /// Copy with list items sorted, used for canonical digests.
    pub fn sorted(&self) -> DataValue {
        match self {
            DataValue::List(items) => {
                let mut items = items.clone();
                items.sort_by(Scalar::canonical_cmp);
                DataValue::List(items)
            }
            other => other.clone(),
        }
    }
}

impl From<Scalar> for DataValue {
    fn from(value: Scalar) -> Self {
        DataValue::Scalar(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Scalar(value.into())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Scalar(value.into())
    }
}

impl From<&String> for DataValue {
    fn from(value: &String) -> Self {
        DataValue::Scalar(value.as_str().into())
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Scalar(value.into())
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Scalar(value.into())
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for DataValue {
    fn from(values: Vec<T>) -> Self {
        DataValue::List(values.into_iter().map(Into::into).collect())
    }
}

pub type DataMap = BTreeMap<String, DataValue>;

/// Tree-shaped staging envelope for one entity and its nested sub-entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "type")]
    entity_type: EntityType,
    #[serde(default)]
    data: DataMap,
    #[serde(default, rename = "relationships", skip_serializing_if = "BTreeMap::is_empty")]
    relations: BTreeMap<String, Vec<Bundle>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    meta: DataMap,
}

impl Bundle {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            id: None,
            entity_type,
            data: BTreeMap::new(),
            relations: BTreeMap::new(),
            meta: BTreeMap::new(),
        }
    }

    /// Create a bundle with initial data; empty values are dropped.
    pub fn with_initial_data(entity_type: EntityType, data: DataMap) -> Self {
        Self::new(entity_type).with_data(data)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn data(&self) -> &DataMap {
        &self.data
    }

    pub fn data_value(&self, key: &str) -> Option<&DataValue> {
        self.data.get(key)
    }

    /// Data value as text, when it is a single text scalar.
    pub fn data_text(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(DataValue::as_str)
    }

    pub fn identifier(&self) -> Option<&str> {
        self.data_text(IDENTIFIER_KEY)
    }

    pub fn name(&self) -> Option<&str> {
        self.data_text(NAME_KEY)
    }

    pub fn language(&self) -> Option<&str> {
        self.data_text(LANGUAGE_KEY)
    }

    pub fn relations(&self) -> &BTreeMap<String, Vec<Bundle>> {
        &self.relations
    }

    pub fn relation(&self, label: &str) -> &[Bundle] {
        self.relations.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn meta(&self) -> &DataMap {
        &self.meta
    }

    pub fn meta_value(&self, key: &str) -> Option<&DataValue> {
        self.meta.get(key)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }

    /// Set one data value. Empty values remove the key.
    pub fn with_data_value(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        let key = key.into();
        let value = value.into();
        if value.is_empty() {
            self.data.remove(&key);
        } else {
            self.data.insert(key, value);
        }
        self
    }

    pub fn without_data_value(mut self, key: &str) -> Self {
        self.data.remove(key);
        self
    }

    pub fn with_data(self, data: DataMap) -> Self {
        data.into_iter()
            .fold(self, |bundle, (k, v)| bundle.with_data_value(k, v))
    }

    /// Replace the whole data map.
    pub fn replace_data(mut self, data: DataMap) -> Self {
        self.data = BTreeMap::new();
        self.with_data(data)
    }

    /// Append a child to the named relation.
    pub fn with_relation(mut self, label: impl Into<String>, child: Bundle) -> Self {
        self.relations.entry(label.into()).or_default().push(child);
        self
    }

    /// Replace the named relation's children.
    pub fn with_relations(mut self, label: impl Into<String>, children: Vec<Bundle>) -> Self {
        let label = label.into();
        if children.is_empty() {
            self.relations.remove(&label);
        } else {
            self.relations.insert(label, children);
        }
        self
    }

    pub fn without_relation(mut self, label: &str) -> Self {
        self.relations.remove(label);
        self
    }

    /// Detach the named relation, returning the bundle and its children.
    pub fn take_relation(mut self, label: &str) -> (Self, Vec<Bundle>) {
        let children = self.relations.remove(label).unwrap_or_default();
        (self, children)
    }

    pub fn with_meta_value(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Number of relation levels below this bundle.
    pub fn depth(&self) -> usize {
        self.relations
            .values()
            .flatten()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Total number of bundles in the tree, this one included.
    pub fn size(&self) -> usize {
        1 + self
            .relations
            .values()
            .flatten()
            .map(Bundle::size)
            .sum::<usize>()
    }

    /// Structural comparison used to decide whether a stored entity changed.
    ///
    /// Ids, meta and managed (`_`-prefixed) keys are ignored, empty relation
    /// lists count as absent, relations compare in order and scalar lists
    /// compare without order unless the type marks the field as ordered.
    pub fn same_content(&self, other: &Bundle) -> bool {
        if self.entity_type != other.entity_type {
            return false;
        }

        let schema = self.entity_type.schema();
        let visible = |data: &DataMap| -> Vec<(String, DataValue)> {
            data.iter()
                .filter(|(k, v)| !k.starts_with(MANAGED_PREFIX) && !v.is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        let ours = visible(&self.data);
        let theirs = visible(&other.data);
        if ours.len() != theirs.len() {
            return false;
        }
        for ((ka, va), (kb, vb)) in ours.iter().zip(theirs.iter()) {
            if ka != kb || !va.same_as(vb, schema.is_ordered(ka)) {
                return false;
            }
        }

        let rels = |b: &Bundle| -> Vec<String> {
            b.relations
                .iter()
                .filter(|(_, children)| !children.is_empty())
                .map(|(label, _)| label.clone())
                .collect()
        };
        let labels = rels(self);
        if labels != rels(other) {
            return false;
        }
        labels.iter().all(|label| {
            let a = self.relation(label);
            let b = other.relation(label);
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_content(y))
        })
    }

    /// Canonical text of the visible data, used for content-derived ids.
    pub fn canonical_data(&self) -> String {
        let canonical: BTreeMap<&String, DataValue> = self
            .data
            .iter()
            .filter(|(k, v)| !k.starts_with(MANAGED_PREFIX) && !v.is_empty())
            .map(|(k, v)| {
                let ordered = self.entity_type.schema().is_ordered(k);
                (k, if ordered { v.clone() } else { v.sorted() })
            })
            .collect();
        serde_json::to_string(&canonical).unwrap_or_default()
    }
}
