//! Authorization URL properties.

use oauth2_resource::{AuthorizationServerInfo, ClientInfo, GrantExchanger};
use proptest::prelude::*;
use url::Url;

fn exchanger(scope: &str) -> GrantExchanger {
    GrantExchanger::new(
        ClientInfo::new("client-1", "secret", scope, "https://app.example.com/cb?x=1"),
        AuthorizationServerInfo::parse(
            "https://auth.example.com/oauth2/authorize",
            "https://auth.example.com/oauth2/token",
        )
        .unwrap(),
        reqwest::Client::new(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_authorize_url_is_deterministic(state in ".{0,64}") {
        let exchanger = exchanger("all");
        prop_assert_eq!(exchanger.authorize_url(&state), exchanger.authorize_url(&state));
    }

    #[test]
    fn prop_authorize_url_round_trips(state in ".{0,64}", scope in "[a-z ]{0,20}") {
        let url = Url::parse(&exchanger(&scope).authorize_url(&state)).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        prop_assert_eq!(url.path(), "/oauth2/authorize");
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        prop_assert_eq!(keys, vec!["client_id", "redirect_uri", "scope", "state", "response_type"]);
        prop_assert_eq!(&pairs[1].1, "https://app.example.com/cb?x=1");
        prop_assert_eq!(&pairs[2].1, &scope);
        prop_assert_eq!(&pairs[3].1, &state);
        prop_assert_eq!(&pairs[4].1, "code");
    }
}
