//! Data model: entity types, bundles, validation errors and mutations

pub mod bundle;
pub mod entity_type;
pub mod error_set;
pub mod mutation;

pub use bundle::{Bundle, DataMap, DataValue, Scalar};
pub use entity_type::{Dependent, EntitySchema, EntityType, IdStrategy};
pub use error_set::ErrorSet;
pub use mutation::{Entity, Mutation, MutationState};
