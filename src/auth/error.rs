//! Authentication errors.

use thiserror::Error;

/// Authentication errors.
///
/// Verification paths never surface these to callers as panics; the boolean
/// `verify` collapses all of them to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Hex or CBOR input could not be decoded.
    #[error("malformed input: {0}")]
    Malformed(String),
    /// Public key object did not carry a 32-byte Ed25519 key.
    #[error("invalid public key")]
    InvalidPublicKey,
    /// Signature envelope was not a 4-element COSE_Sign1 array.
    #[error("invalid signature envelope")]
    InvalidEnvelope,
    /// Protected header declared an algorithm other than EdDSA.
    #[error("unsupported signature algorithm")]
    UnsupportedAlgorithm,
    /// Signed payload differs from the expected challenge.
    #[error("payload mismatch")]
    PayloadMismatch,
    /// Ed25519 verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Key hash does not match the address payment credential.
    #[error("address credential mismatch")]
    AddressMismatch,
    /// No outstanding challenge for this address.
    #[error("no pending challenge")]
    ChallengeNotFound,
    /// Challenge older than the allowed window.
    #[error("challenge expired")]
    Expired,
    /// Session signing secret is not configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Session token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT encoding or decoding error.
    #[error("token error: {0}")]
    Token(String),
}
