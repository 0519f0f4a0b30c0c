//! Authorization-code and refresh-token grant exchange.

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{OAuth2Error, Result};
use crate::grant::types::{
    AuthorizationServerInfo, ClientInfo, GrantType, TokenData, TokenResponse, failure_from_body,
};
use crate::metrics::OAuth2Metrics;

/// Talks to the authorization server on behalf of a registered client.
pub struct GrantExchanger {
    client: ClientInfo,
    server: AuthorizationServerInfo,
    http_client: reqwest::Client,
    metrics: Option<OAuth2Metrics>,
}

impl GrantExchanger {
    /// Creates an exchanger. Timeouts come from the HTTP client.
    pub fn new(
        client: ClientInfo,
        server: AuthorizationServerInfo,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            server,
            http_client,
            metrics: None,
        }
    }

    /// Creates an exchanger from service configuration.
    pub fn from_config(config: &Config, http_client: reqwest::Client) -> Self {
        Self::new(config.client_info(), config.authorization_server_info(), http_client)
    }

    /// Records exchange outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: OAuth2Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The client this exchanger acts for.
    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    /// URL to send the user to for an authorization code.
    ///
    /// Pure: the same `state` always yields the same URL. Existing query
    /// parameters on the authorize URL are kept.
    pub fn authorize_url(&self, state: &str) -> String {
        let mut url = self.server.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client.client_id)
            .append_pair("redirect_uri", &self.client.redirect_uri)
            .append_pair("scope", &self.client.default_scope)
            .append_pair("state", state)
            .append_pair("response_type", "code");
        url.into()
    }

    /// Exchanges an authorization code for tokens.
    #[instrument(skip_all, fields(grant_type = "authorization_code"))]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenData> {
        self.request_token(
            GrantType::AuthorizationCode,
            &[("code", code), ("redirect_uri", self.client.redirect_uri.as_str())],
        )
        .await
    }

    /// Exchanges a refresh token for fresh tokens.
    #[instrument(skip_all, fields(grant_type = "refresh_token"))]
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenData> {
        self.request_token(GrantType::RefreshToken, &[("refresh_token", refresh_token)])
            .await
    }

    async fn request_token(&self, grant_type: GrantType, extra: &[(&str, &str)]) -> Result<TokenData> {
        let result = self.post_token_request(grant_type, extra).await;

        if let Some(metrics) = &self.metrics {
            let outcome = result.as_ref().map_or_else(|e| e.code().as_str(), |_| "ok");
            metrics.record_exchange(grant_type.as_str(), outcome);
        }
        match &result {
            Ok(data) => info!(expires_in = data.expires_in, "Token exchange succeeded"),
            Err(e) => warn!(error = %e, "Token exchange failed"),
        }

        result
    }

    async fn post_token_request(
        &self,
        grant_type: GrantType,
        extra: &[(&str, &str)],
    ) -> Result<TokenData> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.as_str()),
            ("grant_type", grant_type.as_str()),
        ];
        form.extend_from_slice(extra);

        let response = self
            .http_client
            .post(self.server.token_url.clone())
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status != StatusCode::OK {
            return Err(failure_from_body(status.as_u16(), &body));
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| OAuth2Error::invalid_response(format!("undecodable token response: {e}")))?;
        TokenData::try_from(parsed)
    }
}
