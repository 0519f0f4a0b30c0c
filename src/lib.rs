//! OAuth2 resource-server and client helpers.
//!
//! This crate validates bearer tokens presented to a resource server and
//! exchanges authorization grants for tokens:
//! - JWT signature verification against a rotating, publisher-held key set
//! - Claim checks (subject, expiry, issued-at) and scope requirements
//! - Authorization-code and refresh-token grant exchange
//!
//! Request extraction and response translation are left to the caller; the
//! stable [`ErrorCode`] of every [`OAuth2Error`] is the seam for that.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authorizer;
pub mod config;
pub mod error;
pub mod grant;
pub mod http;
pub mod jwt;
pub mod metrics;
pub mod telemetry;

pub use authorizer::Authorizer;
pub use config::{Config, ConfigError};
pub use error::{ErrorCode, OAuth2Error, Result};
pub use grant::{AuthorizationServerInfo, ClientInfo, GrantExchanger, GrantType, TokenData};
pub use http::{HttpConfig, build_http_client};
pub use jwt::{
    ClaimValidator, Clock, KeyCache, KeyStore, MemoryKeyCache, ScopeChecker, TokenValidator,
    ValidatedToken,
};
pub use metrics::OAuth2Metrics;
pub use telemetry::{TracingConfig, init_tracing};
