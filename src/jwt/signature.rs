//! Signature verification against a resolved publisher key.

use jsonwebtoken::crypto;

use crate::error::{OAuth2Error, Result};
use crate::jwt::key_store::PublicKey;
use crate::jwt::token::RawToken;

/// Verifies compact JWS signatures.
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Checks `token` against `key`.
    ///
    /// The header algorithm must be one the key accepts, otherwise
    /// [`OAuth2Error::AlgorithmMismatch`]. The signature is computed over the
    /// transmitted `header.payload` bytes; any failure is
    /// [`OAuth2Error::InvalidSignature`] without further detail.
    pub fn verify(token: &RawToken, key: &PublicKey) -> Result<()> {
        let alg = token.algorithm();
        if !key.accepts(alg) {
            return Err(OAuth2Error::AlgorithmMismatch {
                token_alg: format!("{alg:?}"),
                key_id: key.key_id().to_string(),
            });
        }

        match crypto::verify(token.signature(), token.signing_input(), key.decoding_key(), alg) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(OAuth2Error::InvalidSignature),
        }
    }
}
