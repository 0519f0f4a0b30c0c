//! Validate-then-check-scope entry point for request handlers.

use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::jwt::{ScopeChecker, TokenValidator, ValidatedToken};

/// Validates a bearer token and enforces scopes in one call.
pub struct Authorizer {
    validator: Arc<TokenValidator>,
    default_scopes: Vec<String>,
}

impl Authorizer {
    /// Creates an authorizer. `default_scope` is whitespace separated and
    /// applies whenever a call names no scopes of its own.
    pub fn new(validator: Arc<TokenValidator>, default_scope: &str) -> Self {
        Self {
            validator,
            default_scopes: default_scope.split_whitespace().map(String::from).collect(),
        }
    }

    /// Scopes required when a call passes none.
    pub fn default_scopes(&self) -> &[String] {
        &self.default_scopes
    }

    /// Validates `token`, then requires `required`, or the default scopes
    /// when `required` is empty.
    #[instrument(skip_all, fields(required = ?required))]
    pub async fn authorize(&self, token: Option<&str>, required: &[&str]) -> Result<ValidatedToken> {
        let validated = self.validator.validate(token).await?;
        if required.is_empty() {
            ScopeChecker::require_all(&validated, self.default_scopes.iter().map(String::as_str))?;
        } else {
            ScopeChecker::require_all(&validated, required.iter().copied())?;
        }
        Ok(validated)
    }
}
