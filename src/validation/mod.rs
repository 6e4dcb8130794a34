//! Bundle validation
//!
//! Checks a bundle tree against the schema of each entity type:
//! - mandatory fields are present and non-empty
//! - enum-valued fields hold one of the allowed values
//! - single-valued fields do not hold lists
//! - reserved keys never appear in data
//! - relations are dependents of the type and hold the right child type
//!
//! Problems are collected into an [`ErrorSet`] shaped like the bundle.

use thiserror::Error;

use crate::models::entity_type::RESERVED_KEYS;
use crate::models::{Bundle, DataValue, EntityType, ErrorSet};

/// A bundle failed validation
#[derive(Error, Debug, Clone)]
#[error("Validation failed for {entity_type}{}: {errors}", .id.as_deref().map(|i| format!(" '{}'", i)).unwrap_or_default())]
pub struct ValidationError {
    pub entity_type: EntityType,
    pub id: Option<String>,
    pub errors: ErrorSet,
}

impl ValidationError {
    pub fn new(entity_type: EntityType, id: Option<String>, errors: ErrorSet) -> Self {
        Self {
            entity_type,
            id,
            errors,
        }
    }

    /// A single field error on the top-level bundle.
    pub fn field(
        entity_type: EntityType,
        id: Option<String>,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(entity_type, id, ErrorSet::new().with_error(field, message))
    }
}

/// Validate a bundle tree, returning every problem found.
pub fn validate(bundle: &Bundle) -> ErrorSet {
    let mut errors = ErrorSet::new();
    let schema = bundle.entity_type().schema();

    for key in bundle.data().keys() {
        if RESERVED_KEYS.contains(&key.as_str()) {
            errors.add_error(key.clone(), "reserved key not allowed in data");
        }
    }

    for field in schema.mandatory {
        match bundle.data_value(field) {
            Some(value) if !value.is_empty() => {}
            _ => errors.add_error(*field, "missing mandatory field"),
        }
    }

    for (key, value) in bundle.data() {
        if value.is_list() && !schema.is_multivalued(key) {
            errors.add_error(key.clone(), "multiple values not allowed");
        }
        if let Some(allowed) = schema.allowed_values(key) {
            for text in value.texts() {
                if !allowed.contains(&text.as_str()) {
                    errors.add_error(
                        key.clone(),
                        format!("invalid value '{}', expected one of: {}", text, allowed.join(", ")),
                    );
                }
            }
        }
    }

    for (label, children) in bundle.relations() {
        let Some(dependent) = schema.dependent(label) else {
            errors.add_error(
                label.clone(),
                format!("relation not permitted for {}", bundle.entity_type()),
            );
            continue;
        };
        for (index, child) in children.iter().enumerate() {
            let mut child_errors = validate(child);
            if child.entity_type() != dependent.child {
                child_errors.add_error(
                    "type",
                    format!("expected {}, found {}", dependent.child, child.entity_type()),
                );
            }
            errors.add_relation(label.clone(), index, child_errors);
        }
    }

    errors
}

/// Validate and convert the outcome into a `Result`.
pub fn check(bundle: &Bundle) -> Result<(), ValidationError> {
    let errors = validate(bundle);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(
            bundle.entity_type(),
            bundle.id().map(str::to_string),
            errors,
        ))
    }
}

/// Join list values on fields that only take one value.
///
/// Handlers gather repeated source elements into lists; single-valued
/// fields keep them all, separated by a blank line.
pub fn flatten_single_valued(bundle: Bundle) -> Bundle {
    let schema = bundle.entity_type().schema();
    let flattened: Vec<(String, DataValue)> = bundle
        .data()
        .iter()
        .filter(|(k, v)| v.is_list() && !schema.is_multivalued(k))
        .map(|(k, v)| (k.clone(), DataValue::from(v.texts().join("\n\n"))))
        .collect();

    let relabelled: Vec<(String, Vec<Bundle>)> = bundle
        .relations()
        .iter()
        .map(|(label, children)| {
            (
                label.clone(),
                children.iter().cloned().map(flatten_single_valued).collect(),
            )
        })
        .collect();

    let mut out = flattened
        .into_iter()
        .fold(bundle, |b, (k, v)| b.with_data_value(k, v));
    for (label, children) in relabelled {
        out = out.with_relations(label, children);
    }
    out
}
