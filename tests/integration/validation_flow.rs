//! End-to-end bearer token validation against a mock key publisher.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures::future::join_all;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2_resource::jwt::ClaimValidator;
use oauth2_resource::{OAuth2Error, OAuth2Metrics};
use prometheus::Registry;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::support::{
    NOW, RSA_KID, Signer, claims, jwks, key_store, mount_jwks, mount_jwks_once, validator,
};

#[tokio::test]
async fn test_valid_ed25519_token() {
    let server = MockServer::start().await;
    let signer = Signer::ed25519("ed-1");
    mount_jwks(&server, jwks(&[&signer]), 1).await;

    let validator = validator(Arc::new(key_store(&server)));
    let token = signer.sign(&claims("user-1", "all read"));
    let validated = validator.validate(Some(&token)).await.unwrap();

    assert_eq!(validated.subject(), "user-1");
    assert_eq!(validated.key_id(), Some("ed-1"));
    assert_eq!(validated.issued_at().timestamp(), NOW);
    assert_eq!(validated.expires_at().timestamp(), NOW + 3600);
    assert!(validated.has_scope("all") && validated.has_scope("read"));
    assert_eq!(validated.claims().raw["scope"], json!("all read"));
}

#[tokio::test]
async fn test_valid_rsa_token() {
    let server = MockServer::start().await;
    let signer = Signer::rsa();
    mount_jwks(&server, jwks(&[&signer]), 1).await;

    let validator = validator(Arc::new(key_store(&server)));
    let validated = validator
        .validate(Some(&signer.sign(&claims("user-2", "all"))))
        .await
        .unwrap();

    assert_eq!(validated.subject(), "user-2");
    assert_eq!(validated.key_id(), Some(RSA_KID));
}

#[tokio::test]
async fn test_token_without_kid_uses_single_key() {
    let server = MockServer::start().await;
    let signer = Signer::ed25519("ed-1");
    mount_jwks(&server, jwks(&[&signer]), 1).await;

    let validator = validator(Arc::new(key_store(&server)));
    let token = signer.sign_without_kid(&claims("user-1", "all"));
    assert!(validator.validate(Some(&token)).await.is_ok());
}

#[tokio::test]
async fn test_absent_and_malformed_tokens_never_reach_publisher() {
    let server = MockServer::start().await;
    mount_jwks(&server, jwks(&[]), 0).await;
    let validator = validator(Arc::new(key_store(&server)));

    assert!(matches!(
        validator.validate(None).await,
        Err(OAuth2Error::TokenNotFound)
    ));
    for raw in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
        assert!(
            matches!(
                validator.validate(Some(raw)).await,
                Err(OAuth2Error::MalformedToken { .. })
            ),
            "{raw}"
        );
    }
}

#[tokio::test]
async fn test_expired_token() {
    let server = MockServer::start().await;
    let signer = Signer::ed25519("ed-1");
    mount_jwks(&server, jwks(&[&signer]), 1).await;
    let validator = validator(Arc::new(key_store(&server)));

    for exp in [NOW, NOW - 1, NOW - 3600] {
        let token = signer.sign(&json!({"sub": "u", "iat": NOW - 7200, "exp": exp}));
        match validator.validate(Some(&token)).await {
            Err(OAuth2Error::ExpiredToken { expired_at }) => assert_eq!(expired_at.timestamp(), exp),
            other => panic!("expected expiry for exp={exp}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_premature_token_and_clock_skew() {
    let server = MockServer::start().await;
    let signer = Signer::ed25519("ed-1");
    mount_jwks(&server, jwks(&[&signer]), 1).await;
    let store = Arc::new(key_store(&server));
    let token = signer.sign(&json!({"sub": "u", "iat": NOW + 60, "exp": NOW + 3600}));

    assert!(matches!(
        validator(store.clone()).validate(Some(&token)).await,
        Err(OAuth2Error::PrematureToken { .. })
    ));

    let lenient = validator(store).with_claim_validator(ClaimValidator::new(Duration::from_secs(60)));
    assert!(lenient.validate(Some(&token)).await.is_ok());
}

#[tokio::test]
async fn test_missing_and_malformed_claims() {
    let server = MockServer::start().await;
    let signer = Signer::ed25519("ed-1");
    mount_jwks(&server, jwks(&[&signer]), 1).await;
    let validator = validator(Arc::new(key_store(&server)));

    let no_sub = signer.sign(&json!({"iat": NOW, "exp": NOW + 60}));
    assert!(matches!(
        validator.validate(Some(&no_sub)).await,
        Err(OAuth2Error::MissingClaim { claim: "sub" })
    ));

    let no_exp = signer.sign(&json!({"sub": "u", "iat": NOW}));
    assert!(matches!(
        validator.validate(Some(&no_exp)).await,
        Err(OAuth2Error::MissingClaim { claim: "exp" })
    ));

    let far_exp = signer.sign(&json!({"sub": "u", "iat": NOW, "exp": 9_999_999_999_999_i64}));
    assert!(matches!(
        validator.validate(Some(&far_exp)).await,
        Err(OAuth2Error::MalformedClaims { .. })
    ));

    let not_object = signer.sign(&json!(["sub", "u"]));
    assert!(matches!(
        validator.validate(Some(&not_object)).await,
        Err(OAuth2Error::MalformedClaims { .. })
    ));
}

#[tokio::test]
async fn test_unknown_key_is_invalid_signature() {
    let server = MockServer::start().await;
    let published = Signer::ed25519("published");
    let stranger = Signer::ed25519("stranger");
    mount_jwks(&server, jwks(&[&published]), 1).await;

    let validator = validator(Arc::new(key_store(&server)));
    let err = validator
        .validate(Some(&stranger.sign(&claims("u", "all"))))
        .await
        .unwrap_err();

    assert!(matches!(err, OAuth2Error::InvalidSignature));
    assert_eq!(err.to_string(), "Token signature invalid");
}

#[tokio::test]
async fn test_forged_key_id_is_invalid_signature() {
    let server = MockServer::start().await;
    let published = Signer::ed25519("shared-kid");
    let impostor = Signer::ed25519("shared-kid");
    mount_jwks(&server, jwks(&[&published]), 1).await;

    let validator = validator(Arc::new(key_store(&server)));
    assert!(matches!(
        validator.validate(Some(&impostor.sign(&claims("admin", "all")))).await,
        Err(OAuth2Error::InvalidSignature)
    ));
}

#[tokio::test]
async fn test_tampered_payload_is_invalid_signature() {
    let server = MockServer::start().await;
    let signer = Signer::ed25519("ed-1");
    mount_jwks(&server, jwks(&[&signer]), 1).await;
    let validator = validator(Arc::new(key_store(&server)));

    let token = signer.sign(&claims("user-1", "read"));
    let segments: Vec<&str> = token.split('.').collect();
    let elevated = URL_SAFE_NO_PAD.encode(claims("user-1", "admin").to_string());
    let tampered = format!("{}.{}.{}", segments[0], elevated, segments[2]);

    assert!(matches!(
        validator.validate(Some(&tampered)).await,
        Err(OAuth2Error::InvalidSignature)
    ));
}

#[tokio::test]
async fn test_hmac_with_public_key_as_secret_is_rejected() {
    let server = MockServer::start().await;
    let signer = Signer::rsa();
    mount_jwks(&server, jwks(&[&signer]), 1).await;
    let validator = validator(Arc::new(key_store(&server)));

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(RSA_KID.to_string());
    let forged = jsonwebtoken::encode(
        &header,
        &claims("admin", "all"),
        &EncodingKey::from_secret(include_bytes!("../fixtures/rsa_public.pem")),
    )
    .unwrap();

    let err = validator.validate(Some(&forged)).await.unwrap_err();
    assert!(matches!(err, OAuth2Error::AlgorithmMismatch { .. }));
    assert!(err.is_authentication_failure());
}

#[tokio::test]
async fn test_publisher_outage_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let validator = validator(Arc::new(key_store(&server)));
    let token = Signer::ed25519("ed-1").sign(&claims("u", "all"));
    let err = validator.validate(Some(&token)).await.unwrap_err();

    assert!(matches!(err, OAuth2Error::PublisherUnavailable { status: 503 }));
    assert!(!err.is_authentication_failure());
}

#[tokio::test]
async fn test_unreachable_publisher_is_network_error() {
    // A bare (non-pooled) server actually shuts down when dropped.
    let server = MockServer::builder().start().await;
    let store = Arc::new(key_store(&server));
    drop(server);

    let token = Signer::ed25519("ed-1").sign(&claims("u", "all"));
    let err = validator(store).validate(Some(&token)).await.unwrap_err();
    assert!(matches!(err, OAuth2Error::Network { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_concurrent_validations_during_rotation() {
    let server = MockServer::start().await;
    let (old, new) = (Signer::ed25519("old"), Signer::ed25519("new"));
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[&old, &new])))
        .expect(1..)
        .mount(&server)
        .await;

    let validator = Arc::new(validator(Arc::new(key_store(&server))));
    let tokens: Vec<String> = (0..32)
        .map(|i| {
            let signer = if i % 2 == 0 { &old } else { &new };
            signer.sign(&claims(&format!("user-{i}"), "all"))
        })
        .collect();

    let results = join_all(tokens.iter().map(|token| {
        let validator = validator.clone();
        async move { validator.validate(Some(token.as_str())).await }
    }))
    .await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().subject(), format!("user-{i}"));
    }
}

/// Publisher that cycles through `bodies`, one per request.
struct Alternating {
    bodies: Vec<Value>,
    calls: AtomicUsize,
}

impl Respond for Alternating {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_json(&self.bodies[call % self.bodies.len()])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_validations_during_overlapping_refreshes() {
    let server = MockServer::start().await;
    let (a, b, c) = (Signer::ed25519("a"), Signer::ed25519("b"), Signer::ed25519("c"));
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(Alternating {
            bodies: vec![jwks(&[&a, &b]), jwks(&[&b, &c])],
            calls: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let store = Arc::new(key_store(&server));
    let validator = Arc::new(validator(store.clone()));
    let refreshers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    store.refresh().await.unwrap();
                }
            })
        })
        .collect();

    let tokens: Vec<String> = (0..64)
        .map(|i| b.sign(&claims(&format!("user-{i}"), "all")))
        .collect();
    let results = join_all(tokens.iter().map(|token| {
        let validator = validator.clone();
        async move { validator.validate(Some(token.as_str())).await }
    }))
    .await;

    for refresher in refreshers {
        refresher.await.unwrap();
    }
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(validated) => assert_eq!(validated.subject(), format!("user-{i}")),
            Err(e) => panic!("token {i} rejected during refresh: {e:?}"),
        }
    }
    assert!(store.current().unwrap().get("b").is_some());
}

#[tokio::test]
async fn test_validated_token_outlives_key_removal() {
    let server = MockServer::start().await;
    let (a, c) = (Signer::ed25519("a"), Signer::ed25519("c"));
    mount_jwks_once(&server, jwks(&[&a]), 1).await;
    mount_jwks(&server, jwks(&[&c]), 2).await;

    let store = Arc::new(key_store(&server));
    let validator = validator(store.clone());
    let token = a.sign(&claims("user-1", "read write"));
    let validated = validator.validate(Some(&token)).await.unwrap();
    let claims_before = validated.claims().clone();
    let expires_before = validated.expires_at();

    let set = store.refresh().await.unwrap();
    assert!(set.get("a").is_none());

    assert_eq!(validated.subject(), "user-1");
    assert_eq!(validated.claims(), &claims_before);
    assert_eq!(validated.expires_at(), expires_before);
    assert!(validated.claims().has_scope("write"));
    assert!(matches!(
        validator.validate(Some(&token)).await,
        Err(OAuth2Error::InvalidSignature)
    ));
}

#[tokio::test]
async fn test_validation_outcomes_are_counted() {
    let server = MockServer::start().await;
    let signer = Signer::ed25519("ed-1");
    mount_jwks(&server, jwks(&[&signer]), 1).await;

    let metrics = OAuth2Metrics::new(&Registry::new()).unwrap();
    let validator = validator(Arc::new(key_store(&server))).with_metrics(metrics.clone());
    validator
        .validate(Some(&signer.sign(&claims("u", "all"))))
        .await
        .unwrap();
    let _ = validator.validate(None).await;

    assert_eq!(metrics.validations.with_label_values(&["valid"]).get(), 1.0);
    assert_eq!(metrics.validations.with_label_values(&["TOKEN_NOT_FOUND"]).get(), 1.0);
}
