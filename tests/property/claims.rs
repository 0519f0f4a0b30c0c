//! Claim decoding properties.

use std::collections::BTreeSet;

use oauth2_resource::ClaimValidator;
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_scope_string_decodes_to_set(
        scopes in prop::collection::btree_set("[a-z:_]{1,10}", 0..8),
        sep in prop_oneof![Just(" "), Just("  "), Just("\t")],
    ) {
        let joined = scopes.iter().cloned().collect::<Vec<_>>().join(sep);
        let payload = json!({"sub": "u", "scope": joined}).to_string();
        let claims = ClaimValidator::default().decode(payload.as_bytes(), None).unwrap();
        prop_assert_eq!(claims.scopes, scopes);
    }

    #[test]
    fn prop_scope_list_decodes_to_set(scopes in prop::collection::vec("[a-z]{1,6}", 0..8)) {
        let payload = json!({"sub": "u", "scope": scopes}).to_string();
        let claims = ClaimValidator::default().decode(payload.as_bytes(), None).unwrap();
        let expected: BTreeSet<String> = scopes.into_iter().collect();
        prop_assert_eq!(claims.scopes, expected);
    }

    #[test]
    fn prop_timestamps_survive_decoding(exp in 0i64..4_000_000_000, iat in 0i64..4_000_000_000) {
        let payload = json!({"sub": "u", "exp": exp, "iat": iat}).to_string();
        let claims = ClaimValidator::default().decode(payload.as_bytes(), Some("k")).unwrap();
        prop_assert_eq!(claims.expires_at.map(|t| t.timestamp()), Some(exp));
        prop_assert_eq!(claims.issued_at.map(|t| t.timestamp()), Some(iat));
        prop_assert_eq!(claims.key_id.as_deref(), Some("k"));
    }
}
