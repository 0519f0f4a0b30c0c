//! Scope requirements on validated tokens.
//!
//! Requirements use AND semantics: every required scope must be granted.

use std::collections::BTreeSet;

use crate::error::{OAuth2Error, Result};
use crate::jwt::token::ValidatedToken;

/// Checks granted scopes against a required set.
pub struct ScopeChecker;

impl ScopeChecker {
    /// Required scopes that `granted` does not contain.
    pub fn missing<'a, I>(granted: &BTreeSet<String>, required: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        required
            .into_iter()
            .filter(|scope| !granted.contains(*scope))
            .map(String::from)
            .collect()
    }

    /// Whether `token` holds every scope in `required`.
    pub fn has_all<'a, I>(token: &ValidatedToken, required: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::missing(token.scopes(), required).is_empty()
    }

    /// Like [`has_all`](Self::has_all), failing with
    /// [`OAuth2Error::InsufficientScope`] naming the missing scopes.
    pub fn require_all<'a, I>(token: &ValidatedToken, required: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let missing = Self::missing(token.scopes(), required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OAuth2Error::InsufficientScope { missing })
        }
    }
}
