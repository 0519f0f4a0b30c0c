//! Bearer token validation pipeline.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::{OAuth2Error, Result};
use crate::jwt::claims::{ClaimValidator, Clock, SystemClock};
use crate::jwt::key_store::KeyStore;
use crate::jwt::token::{Decoded, Token, ValidatedToken};
use crate::metrics::OAuth2Metrics;

/// Validates bearer tokens against the publisher's keys.
///
/// Safe to share between tasks; all state lives in the [`KeyStore`].
pub struct TokenValidator {
    key_store: Arc<KeyStore>,
    claims: ClaimValidator,
    clock: Arc<dyn Clock>,
    metrics: Option<OAuth2Metrics>,
}

impl TokenValidator {
    /// Creates a validator using the wall clock and no clock skew.
    pub fn new(key_store: Arc<KeyStore>) -> Self {
        Self {
            key_store,
            claims: ClaimValidator::default(),
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the claim rules, e.g. to allow issuer clock skew.
    #[must_use]
    pub fn with_claim_validator(mut self, claims: ClaimValidator) -> Self {
        self.claims = claims;
        self
    }

    /// Records validation outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: OAuth2Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The key store tokens are resolved against.
    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Validates a bearer token.
    ///
    /// Steps run in order and the first failure is returned: presence,
    /// structure, key resolution, signature, claims. `None` means no token
    /// was presented.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: Option<&str>) -> Result<ValidatedToken> {
        let result = self.run(token).await;

        let outcome = match &result {
            Ok(validated) => {
                debug!(sub = %validated.subject(), kid = ?validated.key_id(), "Token validated");
                "valid"
            }
            Err(e) if e.is_retryable() => {
                info!(error = %e, "Token validation could not complete");
                e.code().as_str()
            }
            Err(e) => {
                debug!(error = %e, "Token rejected");
                e.code().as_str()
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_validation(outcome);
        }

        result
    }

    async fn run(&self, token: Option<&str>) -> Result<ValidatedToken> {
        let raw = token.ok_or(OAuth2Error::TokenNotFound)?;
        let decoded = Token::<Decoded>::parse(raw)?;
        let resolved = decoded.resolve_key(&self.key_store).await?;
        let checked = resolved.verify_signature()?;
        checked.validate_claims(&self.claims, self.clock.now())
    }
}
