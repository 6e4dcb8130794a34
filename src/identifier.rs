//! Hierarchical identifier generation
//!
//! Every persisted entity gets a generated id built from the local
//! identifiers of its scope chain plus its own local identifier. The same
//! inputs always give the same id, which is what makes re-importing an
//! overlapping file idempotent.
//!
//! Dependent sub-entities (descriptions, dates, access points) hang off
//! their parent's generated id with [`DEPENDENT_JOINER`], a character the
//! normaliser never emits, so they can not collide with hierarchical ids.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Separator used between normalised segments.
pub const SEPARATOR: &str = "-";

/// Joiner between a parent id and a dependent's local part.
pub const DEPENDENT_JOINER: &str = ".";

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Identifier generation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Local identifier is empty once normalised
    #[error("Invalid identifier: '{0}' normalises to an empty string")]
    EmptyIdentifier(String),

    /// A scope element normalises to nothing
    #[error("Invalid scope element at position {position}: '{value}'")]
    InvalidScope { position: usize, value: String },
}

/// Normalise one id segment.
///
/// Trims, lower-cases, collapses every run of characters outside
/// `[a-z0-9]` to a single separator and strips separators at both ends.
pub fn normalize(segment: &str) -> String {
    let lowered = segment.trim().to_lowercase();
    let collapsed = NON_ALPHANUMERIC.replace_all(&lowered, SEPARATOR);
    collapsed.trim_matches('-').to_string()
}

/// Generate the id for `local_identifier` inside `scope`.
///
/// # Example
///
/// ```rust
/// use archival_import_sdk::identifier::generate;
///
/// let id = generate(&["repoA".to_string()], "p1").unwrap();
/// assert_eq!(id, "repoa-p1");
/// ```
pub fn generate<S: AsRef<str>>(scope: &[S], local_identifier: &str) -> Result<String, IdError> {
    let local = normalize(local_identifier);
    if local.is_empty() {
        return Err(IdError::EmptyIdentifier(local_identifier.to_string()));
    }

    let mut segments = Vec::with_capacity(scope.len() + 1);
    for (position, element) in scope.iter().enumerate() {
        let normalized = normalize(element.as_ref());
        if normalized.is_empty() {
            return Err(IdError::InvalidScope {
                position,
                value: element.as_ref().to_string(),
            });
        }
        segments.push(normalized);
    }
    segments.push(local);

    Ok(segments.join(SEPARATOR))
}

/// Id of a description dependent: `{parent}.{lang}[-{identifier}]`.
pub fn description_id(
    parent_id: &str,
    language_code: &str,
    identifier: Option<&str>,
) -> Result<String, IdError> {
    let lang = normalize(language_code);
    if lang.is_empty() {
        return Err(IdError::EmptyIdentifier(language_code.to_string()));
    }
    let local = match identifier.map(normalize).filter(|s| !s.is_empty()) {
        Some(ident) => format!("{}{}{}", lang, SEPARATOR, ident),
        None => lang,
    };
    Ok(format!("{}{}{}", parent_id, DEPENDENT_JOINER, local))
}

/// Local part derived from a digest of canonical content: `{prefix}-{hex}`.
pub fn content_local(prefix: &str, canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().take(5).map(|b| format!("{:02x}", b)).collect();
    format!("{}{}{}", prefix, SEPARATOR, hex)
}

/// Id of a dependent without a natural identifier, derived from a digest
/// of its canonical content. `occurrence` counts identical siblings,
/// starting at 1.
pub fn content_id(parent_id: &str, prefix: &str, canonical: &str, occurrence: usize) -> String {
    let local = content_local(prefix, canonical);
    if occurrence > 1 {
        format!("{}{}{}{}{}", parent_id, DEPENDENT_JOINER, local, SEPARATOR, occurrence)
    } else {
        format!("{}{}{}", parent_id, DEPENDENT_JOINER, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Repo A "), "repo-a");
        assert_eq!(normalize("--ABC__12--"), "abc-12");
        assert_eq!(normalize("Wiener Library / 1939"), "wiener-library-1939");
        assert_eq!(normalize("***"), "");
    }

    #[test]
    fn test_generate_with_scope() {
        let scope = vec!["repoA".to_string()];
        assert_eq!(generate(&scope, "p1").unwrap(), "repoa-p1");

        let child_scope = vec!["repoA".to_string(), "p1".to_string()];
        assert_eq!(generate(&child_scope, "c1").unwrap(), "repoa-p1-c1");
    }

    #[test]
    fn test_generate_without_scope() {
        let empty: [&str; 0] = [];
        assert_eq!(generate(&empty, "GB").unwrap(), "gb");
    }

    #[test]
    fn test_generate_rejects_degenerate_identifier() {
        let scope = vec!["repoA"];
        assert!(matches!(
            generate(&scope, ""),
            Err(IdError::EmptyIdentifier(_))
        ));
        assert!(matches!(
            generate(&scope, " -- "),
            Err(IdError::EmptyIdentifier(_))
        ));
    }

    #[test]
    fn test_generate_rejects_empty_scope_element() {
        let scope = vec!["repoA", "!!"];
        assert_eq!(
            generate(&scope, "x"),
            Err(IdError::InvalidScope {
                position: 1,
                value: "!!".to_string()
            })
        );
    }

    #[test]
    fn test_description_id() {
        assert_eq!(description_id("repoa-p1", "EN", None).unwrap(), "repoa-p1.en");
        assert_eq!(
            description_id("repoa-p1", "deu", Some("Alt 2")).unwrap(),
            "repoa-p1.deu-alt-2"
        );
        assert!(description_id("repoa-p1", " ", None).is_err());
    }

    #[test]
    fn test_content_id_is_stable_and_distinguishes_duplicates() {
        let first = content_id("repoa-p1.en", "dateperiod", "startDate=1939", 1);
        let again = content_id("repoa-p1.en", "dateperiod", "startDate=1939", 1);
        let second = content_id("repoa-p1.en", "dateperiod", "startDate=1939", 2);
        assert_eq!(first, again);
        assert!(first.starts_with("repoa-p1.en.dateperiod-"));
        assert_eq!(second, format!("{}-2", first));
    }
}
