//! CLI command implementations

pub mod id;
pub mod import;
pub mod show;
