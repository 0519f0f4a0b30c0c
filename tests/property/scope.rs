//! Scope requirement properties.

use std::collections::BTreeSet;

use oauth2_resource::ScopeChecker;
use proptest::prelude::*;

fn arb_scope() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("all".to_string()),
        Just("read".to_string()),
        Just("write".to_string()),
        "[a-z:_]{1,12}",
    ]
}

fn arb_scopes() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(arb_scope(), 0..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_missing_is_required_minus_granted(granted in arb_scopes(), required in arb_scopes()) {
        let missing = ScopeChecker::missing(&granted, required.iter().map(String::as_str));
        let expected: BTreeSet<String> = required.difference(&granted).cloned().collect();
        prop_assert_eq!(missing, expected);
    }

    #[test]
    fn prop_satisfied_iff_subset(granted in arb_scopes(), required in arb_scopes()) {
        let missing = ScopeChecker::missing(&granted, required.iter().map(String::as_str));
        prop_assert_eq!(missing.is_empty(), required.is_subset(&granted));
    }

    #[test]
    fn prop_empty_requirement_always_satisfied(granted in arb_scopes()) {
        prop_assert!(ScopeChecker::missing(&granted, std::iter::empty::<&str>()).is_empty());
    }

    #[test]
    fn prop_granting_more_never_adds_missing(
        granted in arb_scopes(),
        extra in arb_scopes(),
        required in arb_scopes(),
    ) {
        let before = ScopeChecker::missing(&granted, required.iter().map(String::as_str));
        let widened: BTreeSet<String> = granted.union(&extra).cloned().collect();
        let after = ScopeChecker::missing(&widened, required.iter().map(String::as_str));
        prop_assert!(after.is_subset(&before));
    }
}
