//! Outbound HTTP client for the key publisher and the token endpoint.
//!
//! Both talk to the same authorization server, so one client is built from
//! [`Config`](crate::Config) and handed to the key store and the exchanger.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Timeouts and identification for calls to the authorization server.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request deadline, body included (default: 10s)
    pub timeout: Duration,
    /// TCP and TLS handshake deadline (default: 10s)
    pub connect_timeout: Duration,
    /// `User-Agent` sent with every request
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("oauth2-resource/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Sets the whole-request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the handshake deadline.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Builds the client used for key fetches and grant exchanges.
///
/// TLS goes through rustls with certificate and hostname checks enforced;
/// there is no option to relax them.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    ClientBuilder::new()
        .use_rustls_tls()
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout)
        .user_agent(config.user_agent.as_str())
        .build()
}
