//! Claim decoding and freshness checks.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::error::{OAuth2Error, Result};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Claims read from a token payload. Nothing here has been checked yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClaims {
    /// `sub`
    pub subject: Option<String>,
    /// `scope`, split on whitespace when given as a string
    pub scopes: BTreeSet<String>,
    /// `iat`
    pub issued_at: Option<DateTime<Utc>>,
    /// `exp`
    pub expires_at: Option<DateTime<Utc>>,
    /// `kid` from the token header
    pub key_id: Option<String>,
    /// `aud`
    pub audience: Vec<String>,
    /// The whole payload object
    pub raw: Map<String, Value>,
}

impl DecodedClaims {
    /// Checks a single granted scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct WireClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<Number>,
    #[serde(default)]
    iat: Option<Number>,
    #[serde(default)]
    scope: Option<StringOrList>,
    #[serde(default)]
    aud: Option<StringOrList>,
}

/// Decodes payloads and checks presence and freshness of claims.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimValidator {
    leeway: Duration,
}

impl ClaimValidator {
    /// Creates a validator tolerating `leeway` of issuer clock skew on `iat`.
    #[must_use]
    pub const fn new(leeway: Duration) -> Self {
        Self { leeway }
    }

    /// Allowed clock skew.
    #[must_use]
    pub const fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Parses a base64url-decoded payload into claims.
    pub fn decode(&self, payload: &[u8], key_id: Option<&str>) -> Result<DecodedClaims> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| OAuth2Error::malformed_claims(format!("payload is not JSON: {e}")))?;
        let Value::Object(raw) = value else {
            return Err(OAuth2Error::malformed_claims("payload is not a JSON object"));
        };

        let wire: WireClaims = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| OAuth2Error::malformed_claims(e.to_string()))?;

        Ok(DecodedClaims {
            subject: wire.sub,
            scopes: match wire.scope {
                Some(StringOrList::One(scope)) => {
                    scope.split_whitespace().map(String::from).collect()
                }
                Some(StringOrList::Many(scopes)) => scopes.into_iter().collect(),
                None => BTreeSet::new(),
            },
            issued_at: wire.iat.map(|n| numeric_date(&n, "iat")).transpose()?,
            expires_at: wire.exp.map(|n| numeric_date(&n, "exp")).transpose()?,
            key_id: key_id.map(String::from),
            audience: match wire.aud {
                Some(StringOrList::One(aud)) => vec![aud],
                Some(StringOrList::Many(aud)) => aud,
                None => Vec::new(),
            },
            raw,
        })
    }

    /// Checks required claims, expiry and issued-at against `now`.
    pub fn validate(&self, claims: &DecodedClaims, now: DateTime<Utc>) -> Result<()> {
        if claims.subject.as_deref().is_none_or(str::is_empty) {
            return Err(OAuth2Error::MissingClaim { claim: "sub" });
        }
        let exp = claims
            .expires_at
            .ok_or(OAuth2Error::MissingClaim { claim: "exp" })?;
        let iat = claims
            .issued_at
            .ok_or(OAuth2Error::MissingClaim { claim: "iat" })?;

        if now >= exp {
            return Err(OAuth2Error::ExpiredToken { expired_at: exp });
        }

        let latest_iat = TimeDelta::from_std(self.leeway)
            .ok()
            .and_then(|leeway| now.checked_add_signed(leeway))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if iat > latest_iat {
            return Err(OAuth2Error::PrematureToken { issued_at: iat });
        }

        Ok(())
    }
}

/// Seconds since the epoch, fractions floored. Values chrono cannot
/// represent are malformed rather than clamped.
fn numeric_date(n: &Number, claim: &str) -> Result<DateTime<Utc>> {
    let secs = match n.as_i64() {
        Some(secs) => Some(secs),
        None => n
            .as_f64()
            .map(f64::floor)
            .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64),
    };
    secs.and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| OAuth2Error::malformed_claims(format!("{claim} is not a representable timestamp")))
}
