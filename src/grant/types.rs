//! Client registration, authorization server endpoints and token responses.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{OAuth2Error, Result};

/// Registered client credentials, loaded once at startup.
#[derive(Clone)]
pub struct ClientInfo {
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Scope requested on authorization, space separated
    pub default_scope: String,
    /// Redirect URI registered with the authorization server
    pub redirect_uri: String,
}

impl ClientInfo {
    /// Creates client info.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        default_scope: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            default_scope: default_scope.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Default scopes as individual names.
    pub fn default_scopes(&self) -> impl Iterator<Item = &str> {
        self.default_scope.split_whitespace()
    }
}

impl fmt::Debug for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientInfo")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("default_scope", &self.default_scope)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Authorization server endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationServerInfo {
    /// Where users are sent to grant access
    pub authorize_url: Url,
    /// Where grants are exchanged for tokens
    pub token_url: Url,
}

impl AuthorizationServerInfo {
    /// Creates server info from parsed URLs.
    pub fn new(authorize_url: Url, token_url: Url) -> Self {
        Self {
            authorize_url,
            token_url,
        }
    }

    /// Parses both endpoint URLs.
    pub fn parse(authorize_url: &str, token_url: &str) -> std::result::Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(authorize_url)?, Url::parse(token_url)?))
    }
}

/// Grant types the exchanger speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    /// `authorization_code`
    AuthorizationCode,
    /// `refresh_token`
    RefreshToken,
}

impl GrantType {
    /// Wire name of the grant type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens issued by a successful exchange.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TokenData {
    /// Bearer token to present to resource servers
    pub access_token: String,
    /// Token for the refresh grant, if issued
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Usually `Bearer`
    pub token_type: String,
    /// Granted scope, if the server reported it
    pub scope: Option<String>,
}

impl fmt::Debug for TokenData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenData")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Successful token endpoint body as received.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<Value>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TryFrom<TokenResponse> for TokenData {
    type Error = OAuth2Error;

    fn try_from(response: TokenResponse) -> Result<Self> {
        let access_token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_response("missing access_token"))?;
        let token_type = response
            .token_type
            .ok_or_else(|| OAuth2Error::invalid_response("missing token_type"))?;
        let expires_in = match response.expires_in {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| OAuth2Error::invalid_response("missing or invalid expires_in"))?;

        Ok(Self {
            access_token,
            refresh_token: response.refresh_token,
            expires_in,
            token_type,
            scope: response.scope,
        })
    }
}

/// Maps a non-200 token endpoint answer to an error.
///
/// A JSON object body becomes [`OAuth2Error::OAuthFailure`]; anything else
/// is [`OAuth2Error::InvalidResponse`].
pub(crate) fn failure_from_body(status: u16, body: &[u8]) -> OAuth2Error {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
        return OAuth2Error::invalid_response(format!("status {status} with non-JSON body"));
    };
    let text = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    OAuth2Error::OAuthFailure {
        error: text("error").unwrap_or_else(|| format!("status code: {status}")),
        description: text("error_description"),
        uri: text("error_uri"),
    }
}
