//! Identifier property tests

use archival_import_sdk::identifier::{DEPENDENT_JOINER, SEPARATOR, description_id, generate, normalize};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9][A-Za-z0-9 _./-]{0,12}").unwrap()
}

proptest! {
    #[test]
    fn normalize_is_idempotent(s in ".{0,24}") {
        let once = normalize(&s);
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert!(!once.starts_with(SEPARATOR) && !once.ends_with(SEPARATOR));
        prop_assert!(!once.contains(DEPENDENT_JOINER));
    }

    #[test]
    fn generated_ids_are_stable(scope in proptest::collection::vec(segment(), 0..4), local in segment()) {
        let first = generate(&scope, &local).unwrap();
        let second = generate(&scope, &local).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(first.ends_with(&normalize(&local)));
        prop_assert_eq!(first.clone(), first.to_lowercase());
    }

    #[test]
    fn nested_ids_extend_their_parent(parent in segment(), child in segment()) {
        let parent_id = generate(&[parent.clone()], "p").unwrap();
        let child_id = generate(&[parent, "p".to_string()], &child).unwrap();
        let prefix = format!("{}{}", parent_id, SEPARATOR);
        prop_assert!(child_id.starts_with(&prefix));
    }

    #[test]
    fn description_ids_never_collide_with_hierarchical_ids(scope in segment(), local in segment()) {
        let parent_id = generate(&[scope.clone()], &local).unwrap();
        let description = description_id(&parent_id, "eng", None).unwrap();
        let sibling = generate(&[scope, local], "eng").unwrap();
        prop_assert_ne!(description, sibling);
    }
}

mod identifier_tests {
    use super::*;

    #[test]
    fn test_scope_chain_example() {
        let repo = generate::<&str>(&[], "repoA").unwrap();
        assert_eq!(repo, "repoa");
        assert_eq!(generate(&["repoA"], "p1").unwrap(), "repoa-p1");
        assert_eq!(generate(&["repoA", "p1"], "c1").unwrap(), "repoa-p1-c1");
        assert_eq!(description_id("repoa-p1", "ENG", None).unwrap(), "repoa-p1.eng");
    }

    #[test]
    fn test_blank_local_identifier_is_rejected() {
        assert!(generate(&["repoA"], " / ").is_err());
        assert!(generate(&["***"], "p1").is_err());
    }
}
