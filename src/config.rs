//! Type-Safe Configuration with Validation
//!
//! Loads client registration, endpoint URLs and timeouts from environment
//! variables (with `.env` support) and validates them up front.

use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::grant::{AuthorizationServerInfo, ClientInfo};
use crate::http::HttpConfig;
use crate::jwt::ClaimValidator;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Variable holding the URL
        field: String,
        /// Parser message
        reason: String,
    },

    /// Invalid TTL value
    #[error("Invalid TTL: must be greater than 0")]
    InvalidTtl,

    /// Invalid timeout value
    #[error("Invalid timeout for {0}: must be greater than 0")]
    InvalidTimeout(String),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Client and endpoint configuration.
#[derive(Clone)]
pub struct Config {
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Scope requested on authorization and required by default
    pub default_scope: String,
    /// Registered redirect URI
    pub redirect_uri: Url,
    /// Authorization endpoint
    pub authorize_url: Url,
    /// Token endpoint
    pub token_url: Url,
    /// Key set endpoint
    pub jwk_url: Url,
    /// Connect timeout in seconds (must be > 0)
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds (must be > 0)
    pub request_timeout_secs: u64,
    /// Tolerated issuer clock skew on `iat`, in seconds
    pub clock_skew_secs: u64,
    /// External key cache TTL in seconds (must be > 0)
    pub jwks_cache_ttl_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("default_scope", &self.default_scope)
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("authorize_url", &self.authorize_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("jwk_url", &self.jwk_url.as_str())
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("jwks_cache_ttl_secs", &self.jwks_cache_ttl_secs)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables with validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let config = Self {
            client_id: vars.required("OAUTH2_CLIENT_ID")?,
            client_secret: vars.required("OAUTH2_CLIENT_SECRET")?,
            default_scope: vars.get("OAUTH2_DEFAULT_SCOPE").unwrap_or_else(|| "all".to_string()),
            redirect_uri: vars.url("OAUTH2_REDIRECT_URI")?,
            authorize_url: vars.url("OAUTH2_AUTHORIZE_URL")?,
            token_url: vars.url("OAUTH2_TOKEN_URL")?,
            jwk_url: vars.url("OAUTH2_JWK_URL")?,
            connect_timeout_secs: vars.parse("OAUTH2_CONNECT_TIMEOUT", 10)?,
            request_timeout_secs: vars.parse("OAUTH2_REQUEST_TIMEOUT", 10)?,
            clock_skew_secs: vars.parse("OAUTH2_CLOCK_SKEW", 0)?,
            jwks_cache_ttl_secs: vars.parse("OAUTH2_JWKS_CACHE_TTL", 3600)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingRequired("OAUTH2_CLIENT_ID".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::MissingRequired("OAUTH2_CLIENT_SECRET".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("OAUTH2_CONNECT_TIMEOUT".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("OAUTH2_REQUEST_TIMEOUT".to_string()));
        }
        if self.jwks_cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidTtl);
        }
        Ok(())
    }

    /// Client registration for the grant exchanger.
    #[must_use]
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.default_scope.clone(),
            self.redirect_uri.as_str(),
        )
    }

    /// Authorization server endpoints.
    #[must_use]
    pub fn authorization_server_info(&self) -> AuthorizationServerInfo {
        AuthorizationServerInfo::new(self.authorize_url.clone(), self.token_url.clone())
    }

    /// HTTP client settings for both endpoints.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    /// Claim rules with the configured clock skew.
    #[must_use]
    pub fn claim_validator(&self) -> ClaimValidator {
        ClaimValidator::new(Duration::from_secs(self.clock_skew_secs))
    }

    /// TTL for key sets held in an external cache.
    #[must_use]
    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_secs)
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingRequired(name.to_string()))
    }

    /// Parse a variable with a default value.
    fn parse<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
                name: name.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    /// Parse a required URL variable.
    fn url(&self, name: &str) -> Result<Url, ConfigError> {
        let raw = self.required(name)?;
        Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
            field: name.to_string(),
            reason: e.to_string(),
        })
    }
}
