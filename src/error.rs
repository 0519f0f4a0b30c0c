//! Error handling module with a closed failure taxonomy
//!
//! This module provides a unified error type shared by token validation,
//! key acquisition and grant exchange:
//! - Structured error variants with contextual information
//! - Stable error codes for callers translating failures into responses
//! - Retryability classification
//! - Automatic conversion from transport errors

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = OAuth2Error> = std::result::Result<T, E>;

/// Every failure the crate can report.
///
/// The set is closed on purpose: callers match on it to decide between
/// "log in again", "bad request", "forbidden" and "try later".
#[derive(Error, Debug)]
pub enum OAuth2Error {
    /// No token was presented at all
    #[error("Token not found")]
    TokenNotFound,

    /// Token is not a three-part compact JWS
    #[error("Token malformed: {reason}")]
    MalformedToken {
        /// Description of the malformation
        reason: String,
    },

    /// Signature did not verify, or no trusted key could be resolved
    #[error("Token signature invalid")]
    InvalidSignature,

    /// Header algorithm is incompatible with the resolved key
    #[error("Token algorithm {token_alg} is not accepted for key {key_id}")]
    AlgorithmMismatch {
        /// Algorithm declared in the token header
        token_alg: String,
        /// Key the token was checked against
        key_id: String,
    },

    /// Token has expired
    #[error("Token expired at {expired_at}")]
    ExpiredToken {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Token was issued in the future beyond the allowed skew
    #[error("Token issued in the future at {issued_at}")]
    PrematureToken {
        /// Issued-at claim of the token
        issued_at: DateTime<Utc>,
    },

    /// A required claim is absent
    #[error("Required claim missing: {claim}")]
    MissingClaim {
        /// Name of the missing claim
        claim: &'static str,
    },

    /// Payload is not a claims object or a claim has the wrong type
    #[error("Token claims malformed: {reason}")]
    MalformedClaims {
        /// Description of the structural problem
        reason: String,
    },

    /// Token lacks scopes required by the caller
    #[error("Insufficient scope, missing: {missing:?}")]
    InsufficientScope {
        /// Scopes that were required but not granted
        missing: BTreeSet<String>,
    },

    /// Key endpoint answered without usable keys
    #[error("Key fetch failed: {reason}")]
    KeyFetch {
        /// Description of the fetch failure
        reason: String,
    },

    /// Requested key id is not published, even after a refresh
    #[error("Unknown key id: {key_id}")]
    UnknownKey {
        /// Key id that could not be found
        key_id: String,
    },

    /// Token names no key id and the publisher holds several keys
    #[error("Token has no key id and {available} keys are published")]
    AmbiguousKey {
        /// Number of keys in the current key set
        available: usize,
    },

    /// Key publisher failed with a server error
    #[error("Key publisher unavailable (status {status})")]
    PublisherUnavailable {
        /// HTTP status returned by the publisher
        status: u16,
    },

    /// Key publisher rejected our request
    #[error("Key publisher rejected request (status {status})")]
    PublisherRejectedRequest {
        /// HTTP status returned by the publisher
        status: u16,
    },

    /// Transport failure or timeout
    #[error("Network error: {reason}")]
    Network {
        /// Description of the transport failure
        reason: String,
        /// Whether the failure was a timeout
        timed_out: bool,
    },

    /// Token endpoint answered with something we cannot interpret
    #[error("Invalid response from token endpoint: {reason}")]
    InvalidResponse {
        /// Description of the decoding problem
        reason: String,
    },

    /// Token endpoint returned an OAuth2 error body
    #[error("OAuth2 failure: {error}")]
    OAuthFailure {
        /// OAuth2 `error` code
        error: String,
        /// Optional `error_description`
        description: Option<String>,
        /// Optional `error_uri`
        uri: Option<String>,
    },
}

/// Stable error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TokenNotFound,
    MalformedToken,
    InvalidSignature,
    AlgorithmMismatch,
    ExpiredToken,
    PrematureToken,
    MissingClaim,
    MalformedClaims,
    InsufficientScope,
    KeyFetch,
    UnknownKey,
    AmbiguousKey,
    PublisherUnavailable,
    PublisherRejectedRequest,
    Network,
    InvalidResponse,
    OAuthFailure,
}

impl ErrorCode {
    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::MalformedToken => "TOKEN_MALFORMED",
            Self::InvalidSignature => "TOKEN_SIGNATURE_INVALID",
            Self::AlgorithmMismatch => "TOKEN_ALGORITHM_MISMATCH",
            Self::ExpiredToken => "TOKEN_EXPIRED",
            Self::PrematureToken => "TOKEN_PREMATURE",
            Self::MissingClaim => "CLAIM_MISSING",
            Self::MalformedClaims => "CLAIMS_MALFORMED",
            Self::InsufficientScope => "INSUFFICIENT_SCOPE",
            Self::KeyFetch => "KEY_FETCH_FAILED",
            Self::UnknownKey => "KEY_UNKNOWN",
            Self::AmbiguousKey => "KEY_AMBIGUOUS",
            Self::PublisherUnavailable => "PUBLISHER_UNAVAILABLE",
            Self::PublisherRejectedRequest => "PUBLISHER_REJECTED_REQUEST",
            Self::Network => "NETWORK_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::OAuthFailure => "OAUTH_FAILURE",
        }
    }
}

impl OAuth2Error {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TokenNotFound => ErrorCode::TokenNotFound,
            Self::MalformedToken { .. } => ErrorCode::MalformedToken,
            Self::InvalidSignature => ErrorCode::InvalidSignature,
            Self::AlgorithmMismatch { .. } => ErrorCode::AlgorithmMismatch,
            Self::ExpiredToken { .. } => ErrorCode::ExpiredToken,
            Self::PrematureToken { .. } => ErrorCode::PrematureToken,
            Self::MissingClaim { .. } => ErrorCode::MissingClaim,
            Self::MalformedClaims { .. } => ErrorCode::MalformedClaims,
            Self::InsufficientScope { .. } => ErrorCode::InsufficientScope,
            Self::KeyFetch { .. } => ErrorCode::KeyFetch,
            Self::UnknownKey { .. } => ErrorCode::UnknownKey,
            Self::AmbiguousKey { .. } => ErrorCode::AmbiguousKey,
            Self::PublisherUnavailable { .. } => ErrorCode::PublisherUnavailable,
            Self::PublisherRejectedRequest { .. } => ErrorCode::PublisherRejectedRequest,
            Self::Network { .. } => ErrorCode::Network,
            Self::InvalidResponse { .. } => ErrorCode::InvalidResponse,
            Self::OAuthFailure { .. } => ErrorCode::OAuthFailure,
        }
    }

    /// Check if the caller may retry the same call later.
    ///
    /// Only infrastructure failures qualify; anything about the token or the
    /// grant itself is definitive.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PublisherUnavailable { .. } | Self::Network { .. })
    }

    /// Check if this error means the presented token must not be trusted.
    ///
    /// Collaborators typically answer these with 401 and everything else
    /// with 403, 400 or 503.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFound
                | Self::MalformedToken { .. }
                | Self::InvalidSignature
                | Self::AlgorithmMismatch { .. }
                | Self::ExpiredToken { .. }
                | Self::PrematureToken { .. }
                | Self::MissingClaim { .. }
                | Self::MalformedClaims { .. }
        )
    }

    /// Suggested back-off for retryable errors
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::PublisherUnavailable { .. } => Some(Duration::from_secs(5)),
            Self::Network { .. } => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    pub(crate) fn malformed_token(reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_claims(reason: impl Into<String>) -> Self {
        Self::MalformedClaims {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for OAuth2Error {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the URL in its message; strip it so query strings
        // never reach logs.
        let timed_out = err.is_timeout();
        let reason = if timed_out {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else {
            err.without_url().to_string()
        };
        OAuth2Error::Network { reason, timed_out }
    }
}
