//! Bearer token validation
//!
//! Provides:
//! - Key set fetching with atomic publication and refresh-on-unknown-kid
//! - Signature verification restricted to the key's algorithm family
//! - Claim decoding and freshness checks with an injectable clock
//! - Type-state token pipeline producing [`ValidatedToken`]
//! - Scope requirements

pub mod cache;
pub mod claims;
pub mod key_store;
pub mod scope;
pub mod signature;
pub mod token;
pub mod validator;

pub use cache::{KeyCache, MemoryKeyCache};
pub use claims::{ClaimValidator, Clock, DecodedClaims, FixedClock, SystemClock};
pub use key_store::{Jwk, Jwks, KeyFamily, KeySet, KeyStore, PublicKey};
pub use scope::ScopeChecker;
pub use signature::SignatureVerifier;
pub use token::{Decoded, KeyResolved, RawToken, SignatureChecked, Token, TokenState, ValidatedToken};
pub use validator::TokenValidator;
