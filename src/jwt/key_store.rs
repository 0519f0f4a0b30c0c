//! Publisher key set fetching and caching
//!
//! Implements a JWKS-backed key store that:
//! - Publishes each fetched key set atomically through `ArcSwapOption`
//! - Refreshes at most once per lookup when a key id is unknown
//! - Optionally mirrors the key set into an external [`KeyCache`] with a TTL

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::{OAuth2Error, Result};
use crate::jwt::cache::KeyCache;
use crate::metrics::OAuth2Metrics;

/// Shortest accepted base64url RSA modulus (2048 bits).
const MIN_RSA_MODULUS_B64_LEN: usize = 340;

/// JSON Web Key structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC, OKP)
    pub kty: String,
    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// EC x coordinate, or OKP public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// EC or OKP curve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
}

/// JSON Web Key Set structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    /// List of keys
    pub keys: Vec<Jwk>,
}

/// Key set as received, before individual keys are checked.
#[derive(Deserialize)]
struct RawJwks {
    keys: Vec<serde_json::Value>,
}

/// Algorithm family a published key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// RSA keys (RS*, PS*)
    Rsa,
    /// NIST curve keys (ES*)
    Ec,
    /// Octet key pairs (EdDSA)
    Okp,
}

impl KeyFamily {
    /// Family an algorithm verifies with. Symmetric algorithms have none.
    #[must_use]
    pub fn of(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(Self::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(Self::Ec),
            Algorithm::EdDSA => Some(Self::Okp),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
        }
    }
}

/// A verified-shape public key from the publisher's key set.
pub struct PublicKey {
    key_id: String,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
    jwk: Jwk,
}

impl PublicKey {
    /// Builds a key from a JWK, rejecting keys unfit for signature checks.
    pub fn from_jwk(jwk: &Jwk) -> std::result::Result<Self, String> {
        let key_id = jwk
            .kid
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| "missing kid".to_string())?;

        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(format!("key use {key_use} is not sig"));
            }
        }

        let declared = jwk
            .alg
            .as_deref()
            .map(|alg| Algorithm::from_str(alg).map_err(|_| format!("unsupported alg {alg}")))
            .transpose()?;

        let (family, implied, decoding_key) = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or("RSA key without n")?;
                let e = jwk.e.as_deref().ok_or("RSA key without e")?;
                if n.len() < MIN_RSA_MODULUS_B64_LEN {
                    return Err("RSA key too small".to_string());
                }
                let key = DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?;
                (KeyFamily::Rsa, None, key)
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or("EC key without x")?;
                let y = jwk.y.as_deref().ok_or("EC key without y")?;
                let implied = match jwk.crv.as_deref().unwrap_or("P-256") {
                    "P-256" => Algorithm::ES256,
                    "P-384" => Algorithm::ES384,
                    crv => return Err(format!("unsupported curve {crv}")),
                };
                let key = DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?;
                (KeyFamily::Ec, Some(implied), key)
            }
            "OKP" => {
                let x = jwk.x.as_deref().ok_or("OKP key without x")?;
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err("OKP key is not Ed25519".to_string());
                }
                let key = DecodingKey::from_ed_components(x).map_err(|e| e.to_string())?;
                (KeyFamily::Okp, Some(Algorithm::EdDSA), key)
            }
            kty => return Err(format!("unsupported key type {kty}")),
        };

        let algorithm = match (declared, implied) {
            (Some(declared), Some(implied)) if declared != implied => {
                return Err(format!("alg {declared:?} does not fit the key"));
            }
            (Some(declared), _) if KeyFamily::of(declared) != Some(family) => {
                return Err(format!("alg {declared:?} does not fit the key"));
            }
            (declared, implied) => declared.or(implied),
        };

        Ok(Self {
            key_id,
            family,
            algorithm,
            decoding_key,
            jwk: jwk.clone(),
        })
    }

    /// Key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm family of the key material.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Declared or curve-implied algorithm, if the key pins one.
    #[must_use]
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for signature checks.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// The JWK the key was built from.
    #[must_use]
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Whether a token signed with `alg` may be checked against this key.
    #[must_use]
    pub fn accepts(&self, alg: Algorithm) -> bool {
        match self.algorithm {
            Some(pinned) => pinned == alg,
            None => KeyFamily::of(alg) == Some(self.family),
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.key_id == other.key_id && self.jwk == other.jwk
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_id", &self.key_id)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the publisher's usable keys, unique by key id.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<Arc<PublicKey>>,
}

impl KeySet {
    /// Builds a key set, skipping unusable keys. A later key with an
    /// already-seen id replaces the earlier one.
    #[must_use]
    pub fn from_jwks(jwks: &[Jwk]) -> Self {
        let mut keys: Vec<Arc<PublicKey>> = Vec::with_capacity(jwks.len());
        for jwk in jwks {
            match PublicKey::from_jwk(jwk) {
                Ok(key) => {
                    let key = Arc::new(key);
                    match keys.iter_mut().find(|k| k.key_id == key.key_id) {
                        Some(slot) => *slot = key,
                        None => keys.push(key),
                    }
                }
                Err(reason) => {
                    warn!(kid = ?jwk.kid, kty = %jwk.kty, %reason, "Skipping unusable JWK");
                }
            }
        }
        Self { keys }
    }

    /// Looks up a key by id.
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<&Arc<PublicKey>> {
        self.keys.iter().find(|key| key.key_id == key_id)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids in publication order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|key| key.key_id.as_str())
    }

    /// Keys in publication order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PublicKey>> {
        self.keys.iter()
    }

    /// Serializable form holding only the usable keys.
    #[must_use]
    pub fn to_jwks(&self) -> Jwks {
        Jwks {
            keys: self.keys.iter().map(|key| key.jwk.clone()).collect(),
        }
    }
}

/// Fetches and caches the publisher's signing keys.
pub struct KeyStore {
    http_client: reqwest::Client,
    jwk_url: Url,
    client_id: String,
    current: ArcSwapOption<KeySet>,
    cache: Option<Arc<dyn KeyCache>>,
    cache_ttl: Duration,
    metrics: Option<OAuth2Metrics>,
}

impl KeyStore {
    /// Creates a key store for `jwk_url`, identifying as `client_id`.
    pub fn new(http_client: reqwest::Client, jwk_url: Url, client_id: impl Into<String>) -> Self {
        Self {
            http_client,
            jwk_url,
            client_id: client_id.into(),
            current: ArcSwapOption::empty(),
            cache: None,
            cache_ttl: Duration::from_secs(3600),
            metrics: None,
        }
    }

    /// Creates a key store from service configuration.
    pub fn from_config(config: &Config, http_client: reqwest::Client) -> Self {
        Self::new(http_client, config.jwk_url.clone(), config.client_id.clone())
    }

    /// Backs the key set with an external cache; entries live for `ttl`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn KeyCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    /// Records refresh outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: OAuth2Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The last published key set, if any fetch has succeeded.
    #[must_use]
    pub fn current(&self) -> Option<Arc<KeySet>> {
        self.current.load_full()
    }

    /// Resolves the key for a token header's `kid`.
    ///
    /// An unknown `kid` triggers exactly one refresh before failing with
    /// [`OAuth2Error::UnknownKey`]. Without a `kid` the set must hold exactly
    /// one key, otherwise [`OAuth2Error::AmbiguousKey`] is returned.
    #[instrument(skip_all, fields(kid = ?key_id))]
    pub async fn get_key(&self, key_id: Option<&str>) -> Result<Arc<PublicKey>> {
        let (set, fresh) = self.snapshot().await?;

        let Some(kid) = key_id else {
            return match set.len() {
                1 => Ok(set.keys[0].clone()),
                available => Err(OAuth2Error::AmbiguousKey { available }),
            };
        };

        if let Some(key) = set.get(kid) {
            return Ok(key.clone());
        }
        if fresh {
            return Err(OAuth2Error::UnknownKey {
                key_id: kid.to_string(),
            });
        }

        debug!("Key id not in cached set, refreshing once");
        let set = self.refresh().await?;
        set.get(kid).cloned().ok_or_else(|| OAuth2Error::UnknownKey {
            key_id: kid.to_string(),
        })
    }

    /// Fetches the key set from the publisher and publishes it.
    ///
    /// Concurrent refreshes race; whichever stores last wins. Readers always
    /// see one complete set.
    #[instrument(skip(self), fields(url = %self.jwk_url))]
    pub async fn refresh(&self) -> Result<Arc<KeySet>> {
        let result = self.fetch_key_set().await;
        if let Some(metrics) = &self.metrics {
            let label = result.as_ref().map_or_else(|e| e.code().as_str(), |_| "ok");
            metrics.record_key_refresh(label);
        }

        let set = match result {
            Ok(set) => Arc::new(set),
            Err(e) => {
                warn!(error = %e, "Key set refresh failed");
                return Err(e);
            }
        };
        self.current.store(Some(set.clone()));

        if let Some(cache) = &self.cache {
            match serde_json::to_vec(&set.to_jwks()) {
                Ok(bytes) => cache.set(&self.cache_key(), bytes, self.cache_ttl).await,
                Err(e) => warn!(error = %e, "Failed to serialize key set for cache"),
            }
        }

        info!(keys = set.len(), "Key set refreshed");
        Ok(set)
    }

    /// Current key set and whether it was fetched by this call.
    ///
    /// A cache hit matching the published set reuses it; a different cached
    /// set is published in its place. A cache miss falls back to the
    /// published set and only fetches when nothing has been published yet.
    async fn snapshot(&self) -> Result<(Arc<KeySet>, bool)> {
        let current = self.current.load_full();

        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.get(&self.cache_key()).await {
                match serde_json::from_slice::<Jwks>(&bytes) {
                    Ok(jwks) => {
                        if let Some(set) = current.as_ref().filter(|set| set.to_jwks() == jwks) {
                            return Ok((set.clone(), false));
                        }
                        let set = KeySet::from_jwks(&jwks.keys);
                        if !set.is_empty() {
                            let set = Arc::new(set);
                            self.current.store(Some(set.clone()));
                            return Ok((set, false));
                        }
                    }
                    Err(e) => warn!(error = %e, "Discarding undecodable cached key set"),
                }
            }
        }

        match current {
            Some(set) => Ok((set, false)),
            None => Ok((self.refresh().await?, true)),
        }
    }

    async fn fetch_key_set(&self) -> Result<KeySet> {
        let response = self
            .http_client
            .get(self.jwk_url.clone())
            .query(&[("client_id", self.client_id.as_str())])
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(OAuth2Error::PublisherUnavailable {
                status: status.as_u16(),
            });
        }
        if status.is_client_error() {
            return Err(OAuth2Error::PublisherRejectedRequest {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(OAuth2Error::KeyFetch {
                reason: format!("unexpected status {status}"),
            });
        }

        let body = response.bytes().await?;
        let raw: RawJwks = serde_json::from_slice(&body).map_err(|e| OAuth2Error::KeyFetch {
            reason: format!("undecodable key set: {e}"),
        })?;

        let jwks: Vec<Jwk> = raw
            .keys
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Jwk>(value) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable JWK");
                    None
                }
            })
            .collect();

        let set = KeySet::from_jwks(&jwks);
        if set.is_empty() {
            return Err(OAuth2Error::KeyFetch {
                reason: "publisher returned no usable keys".to_string(),
            });
        }
        Ok(set)
    }

    fn cache_key(&self) -> String {
        format!("jwks:{}:{}", self.jwk_url, self.client_id)
    }
}
