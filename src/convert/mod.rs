//! Conversion between bundles, text and stored entities
//!
//! Text formats (JSON and YAML) share one layout:
//!
//! ```json
//! {
//!   "id": "repoa-p1",
//!   "type": "DocumentaryUnit",
//!   "data": { "identifier": "p1" },
//!   "relationships": { "describes": [ { "type": "DocumentaryUnitDescription", "data": {} } ] }
//! }
//! ```
//!
//! Null values are dropped on the way in. Graph entities are materialised
//! by following the dependent relations of their type, to a bounded depth.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::entity_type::{MANAGED_PREFIX, RESERVED_KEYS};
use crate::models::{Bundle, DataValue, EntityType, Scalar};
use crate::storage::GraphRead;

/// Default traversal depth when materialising entities.
pub const DEFAULT_DEPTH: usize = 4;

/// Conversion errors
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid bundle at {path}: {reason}")]
    InvalidBundle { path: String, reason: String },

    #[error("Entity not found: {0}")]
    NotFound(String),
}

/// Supported text formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Json,
    Yaml,
}

/// Parse a JSON bundle.
pub fn to_bundle(text: &str) -> Result<Bundle, ConvertError> {
    parse(text, TextFormat::Json)
}

/// Serialize a bundle as pretty JSON.
pub fn to_text(bundle: &Bundle) -> Result<String, ConvertError> {
    render(bundle, TextFormat::Json)
}

pub fn parse(text: &str, format: TextFormat) -> Result<Bundle, ConvertError> {
    let value: Value = match format {
        TextFormat::Json => serde_json::from_str(text)?,
        TextFormat::Yaml => serde_yaml::from_str(text)?,
    };
    bundle_from_value(&value, "$")
}

pub fn render(bundle: &Bundle, format: TextFormat) -> Result<String, ConvertError> {
    Ok(match format {
        TextFormat::Json => serde_json::to_string_pretty(bundle)?,
        TextFormat::Yaml => serde_yaml::to_string(bundle)?,
    })
}

fn invalid(path: &str, reason: impl Into<String>) -> ConvertError {
    ConvertError::InvalidBundle {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Build a bundle from an already parsed JSON value.
pub fn bundle_from_value(value: &Value, path: &str) -> Result<Bundle, ConvertError> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid(path, "expected an object"))?;

    let type_name = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(path, "missing 'type'"))?;
    let entity_type: EntityType = type_name.parse().map_err(|e: String| invalid(path, e))?;

    let mut bundle = Bundle::new(entity_type);
    if let Some(id) = object.get("id").and_then(Value::as_str) {
        bundle = bundle.with_id(id);
    }

    for (key, raw) in section(object, "data", path)? {
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(invalid(path, format!("reserved key '{}' in data", key)));
        }
        if let Some(value) = data_value(raw, &format!("{}.data.{}", path, key))? {
            bundle = bundle.with_data_value(key.clone(), value);
        }
    }

    for (key, raw) in section(object, "meta", path)? {
        if let Some(value) = data_value(raw, &format!("{}.meta.{}", path, key))? {
            bundle = bundle.with_meta_value(key.clone(), value);
        }
    }

    for (label, raw) in section(object, "relationships", path)? {
        let children = match raw {
            Value::Array(items) => items.as_slice(),
            Value::Null => continue,
            _ => return Err(invalid(path, format!("relationship '{}' must be a list", label))),
        };
        for (index, child) in children.iter().enumerate() {
            let child_path = format!("{}.relationships.{}[{}]", path, label, index);
            bundle = bundle.with_relation(label.clone(), bundle_from_value(child, &child_path)?);
        }
    }

    Ok(bundle)
}

fn section<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Vec<(&'a String, &'a Value)>, ConvertError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map.iter().collect()),
        Some(_) => Err(invalid(path, format!("'{}' must be an object", key))),
    }
}

fn scalar(value: &Value, path: &str) -> Result<Option<Scalar>, ConvertError> {
    Ok(match value {
        Value::Null => None,
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Scalar::Int(i)),
            None => n.as_f64().map(Scalar::Float),
        },
        Value::String(s) => Some(Scalar::Text(s.clone())),
        _ => return Err(invalid(path, "nested structures are not allowed in data")),
    })
}

fn data_value(value: &Value, path: &str) -> Result<Option<DataValue>, ConvertError> {
    match value {
        Value::Array(items) => {
            let mut list = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                if let Some(s) = scalar(item, &format!("{}[{}]", path, i))? {
                    list.push(s);
                }
            }
            Ok(Some(DataValue::List(list)))
        }
        other => Ok(scalar(other, path)?.map(DataValue::Scalar)),
    }
}

/// Materialises stored entities back into bundles
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    max_depth: usize,
}

impl Default for Serializer {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_DEPTH,
        }
    }
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow at most `depth` levels of dependent relations.
    pub fn with_depth(depth: usize) -> Self {
        Self { max_depth: depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Materialise the stored entity `id` as a bundle.
    ///
    /// Reserved and managed keys are left out of the data map; the generated
    /// id is carried in the bundle's id slot.
    pub fn entity_to_bundle<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        id: &str,
    ) -> Result<Bundle, ConvertError> {
        self.materialise(graph, id, 0)
    }

    fn materialise<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        id: &str,
        level: usize,
    ) -> Result<Bundle, ConvertError> {
        let vertex = graph
            .vertex(id)
            .ok_or_else(|| ConvertError::NotFound(id.to_string()))?;

        let data = vertex
            .properties
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()) && !k.starts_with(MANAGED_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut bundle = Bundle::with_initial_data(vertex.entity_type, data).with_id(vertex.id.clone());

        if level < self.max_depth {
            for dependent in vertex.entity_type.schema().dependents {
                let children = graph
                    .out_edges(id, dependent.label)
                    .iter()
                    .map(|child| self.materialise(graph, child, level + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                bundle = bundle.with_relations(dependent.label, children);
            }
        }

        Ok(bundle)
    }
}
