//! Type-State JWT Token with compile-time validation guarantees
//!
//! A bearer token moves through `Decoded → KeyResolved → SignatureChecked`
//! and ends as a [`ValidatedToken`]. Each transition consumes the previous
//! state, so claims can only be read from a token that passed every check.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header};
use tracing::debug;

use crate::error::{OAuth2Error, Result};
use crate::jwt::claims::{ClaimValidator, DecodedClaims};
use crate::jwt::key_store::{KeyStore, PublicKey};
use crate::jwt::signature::SignatureVerifier;

// ============================================================================
// Raw compact serialization
// ============================================================================

/// The three segments of a compact JWS, exactly as received.
pub struct RawToken {
    raw: String,
    header: Header,
    payload: Vec<u8>,
    signing_input_len: usize,
}

impl RawToken {
    /// Splits and decodes a compact JWS.
    ///
    /// Fails with [`OAuth2Error::MalformedToken`] unless there are exactly
    /// three non-empty segments, the first a base64url JOSE header and the
    /// second base64url. The signature segment is left for verification.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(OAuth2Error::malformed_token("empty token"));
        }

        let segments: Vec<&str> = raw.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments[..] else {
            return Err(OAuth2Error::malformed_token(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };
        if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(OAuth2Error::malformed_token("empty segment"));
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| OAuth2Error::malformed_token("header is not base64url"))?;
        let header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|_| OAuth2Error::malformed_token("header is not a JOSE header"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| OAuth2Error::malformed_token("payload is not base64url"))?;

        Ok(Self {
            raw: raw.to_string(),
            header,
            payload,
            signing_input_len: header_b64.len() + 1 + payload_b64.len(),
        })
    }

    /// Decoded JOSE header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Algorithm the header declares.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    /// `kid` from the header, if any.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// Decoded payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// `header.payload` bytes as transmitted.
    #[must_use]
    pub fn signing_input(&self) -> &[u8] {
        &self.raw.as_bytes()[..self.signing_input_len]
    }

    /// Signature segment, still base64url encoded.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.raw[self.signing_input_len + 1..]
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawToken")
            .field("alg", &self.header.alg)
            .field("kid", &self.header.kid)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Sealed Trait Pattern for Token States
// ============================================================================

mod private {
    /// Sealed trait to prevent external implementations
    pub trait Sealed {}
}

/// Marker trait for token validation states
pub trait TokenState: private::Sealed {
    /// Human-readable state name for debugging
    fn state_name() -> &'static str;
}

/// Segments split and decoded, nothing verified
#[derive(Debug)]
pub struct Decoded;
impl private::Sealed for Decoded {}
impl TokenState for Decoded {
    fn state_name() -> &'static str {
        "Decoded"
    }
}

/// A trusted key for the token has been selected
#[derive(Debug)]
pub struct KeyResolved;
impl private::Sealed for KeyResolved {}
impl TokenState for KeyResolved {
    fn state_name() -> &'static str {
        "KeyResolved"
    }
}

/// Signature verified against the resolved key
#[derive(Debug)]
pub struct SignatureChecked;
impl private::Sealed for SignatureChecked {}
impl TokenState for SignatureChecked {
    fn state_name() -> &'static str {
        "SignatureChecked"
    }
}

// ============================================================================
// Type-State Token Wrapper
// ============================================================================

/// Type-state token wrapper that enforces validation order at compile time
#[derive(Debug)]
pub struct Token<State: TokenState> {
    raw: RawToken,
    key: Option<Arc<PublicKey>>,
    _state: PhantomData<State>,
}

impl<S: TokenState> Token<S> {
    /// Get the current state name
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }

    /// The underlying raw token
    pub fn raw(&self) -> &RawToken {
        &self.raw
    }

    fn advance<T: TokenState>(self) -> Token<T> {
        Token {
            raw: self.raw,
            key: self.key,
            _state: PhantomData,
        }
    }
}

impl Token<Decoded> {
    /// Parse a compact JWS into a decoded token
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Token {
            raw: RawToken::parse(raw)?,
            key: None,
            _state: PhantomData,
        })
    }

    /// Resolves the verification key through the key store.
    ///
    /// Publisher outages and transport failures pass through unchanged; every
    /// other key-resolution failure is reported as
    /// [`OAuth2Error::InvalidSignature`] so a bad token learns nothing about
    /// the key infrastructure.
    pub async fn resolve_key(self, store: &KeyStore) -> Result<Token<KeyResolved>> {
        let resolved = store.get_key(self.raw.key_id()).await;
        match resolved {
            Ok(key) => Ok(self.with_key(key)),
            Err(e @ (OAuth2Error::Network { .. } | OAuth2Error::PublisherUnavailable { .. })) => {
                Err(e)
            }
            Err(e) => {
                debug!(error = %e, "Key resolution failed");
                Err(OAuth2Error::InvalidSignature)
            }
        }
    }

    /// Pairs the token with an already-resolved key
    pub fn with_key(mut self, key: Arc<PublicKey>) -> Token<KeyResolved> {
        self.key = Some(key);
        self.advance()
    }
}

impl Token<KeyResolved> {
    /// Verify the signature against the resolved key
    pub fn verify_signature(self) -> Result<Token<SignatureChecked>> {
        let key = self.key.as_ref().ok_or(OAuth2Error::InvalidSignature)?;
        SignatureVerifier::verify(&self.raw, key)?;
        Ok(self.advance())
    }
}

impl Token<SignatureChecked> {
    /// Decode and check claims, producing the validated token
    pub fn validate_claims(
        self,
        validator: &ClaimValidator,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken> {
        let claims = validator.decode(self.raw.payload(), self.raw.key_id())?;
        validator.validate(&claims, now)?;
        ValidatedToken::from_checked(claims)
    }
}

// ============================================================================
// Validated result
// ============================================================================

/// A token whose signature, expiry and required claims have all been checked.
///
/// Only obtainable from [`TokenValidator::validate`](super::TokenValidator::validate).
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    subject: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    claims: DecodedClaims,
}

impl ValidatedToken {
    fn from_checked(claims: DecodedClaims) -> Result<Self> {
        let subject = claims
            .subject
            .clone()
            .ok_or(OAuth2Error::MissingClaim { claim: "sub" })?;
        let issued_at = claims
            .issued_at
            .ok_or(OAuth2Error::MissingClaim { claim: "iat" })?;
        let expires_at = claims
            .expires_at
            .ok_or(OAuth2Error::MissingClaim { claim: "exp" })?;
        Ok(Self {
            subject,
            issued_at,
            expires_at,
            claims,
        })
    }

    /// All decoded claims
    pub fn claims(&self) -> &DecodedClaims {
        &self.claims
    }

    /// Get the subject claim
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Get the granted scopes
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.claims.scopes
    }

    /// Check if the token has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.claims.has_scope(scope)
    }

    /// Get the audience claim
    pub fn audience(&self) -> &[String] {
        &self.claims.audience
    }

    /// Get the key id the token was verified with, if it named one
    pub fn key_id(&self) -> Option<&str> {
        self.claims.key_id.as_deref()
    }

    /// Get the issued-at time
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Get the expiration time
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is still unexpired at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whether the token is still unexpired now
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}
