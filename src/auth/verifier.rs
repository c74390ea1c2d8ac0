//! Wallet Signature Verification
//!
//! Verifies that a wallet controlling `claimed_address` signed an expected
//! payload. The public key is bound to the address by recomputing its
//! payment credential, so a valid signature from a different key is still
//! rejected.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::challenge::{self, AuthChallenge};
use super::cose::{parse_cose_key, CoseSign1};
use super::error::AuthError;
use crate::core::hash::{constant_time_eq, PaymentKeyHash};

/// Signature material returned by a wallet's `signData` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSignature {
    /// Hex-encoded CBOR `COSE_Sign1`.
    pub signature: String,
    /// Hex-encoded CBOR `COSE_Key`.
    pub key: String,
}

/// Challenge-response verifier for wallet logins.
#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    app_name: String,
}

impl SignatureVerifier {
    /// Create a verifier whose challenge messages name `app_name`.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self { app_name: app_name.into() }
    }

    /// Application name embedded in challenge messages.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Issue a fresh challenge.
    pub fn generate_challenge(&self) -> AuthChallenge {
        AuthChallenge::generate()
    }

    /// Message text the wallet must sign for `challenge`.
    pub fn challenge_message(&self, challenge: &AuthChallenge) -> String {
        challenge.message(&self.app_name)
    }

    /// Whether a challenge timestamp (unix millis) is older than five minutes.
    pub fn is_expired(&self, timestamp_ms: u64) -> bool {
        challenge::is_expired_at(timestamp_ms, challenge::now_millis())
    }

    /// Fail-closed verification.
    ///
    /// Returns `false` on any malformed, mismatched or invalid input.
    pub fn verify(&self, claimed_address: &str, payload: &[u8], signature: &WalletSignature) -> bool {
        match self.try_verify(claimed_address, payload, signature) {
            Ok(_) => true,
            Err(e) => {
                debug!("Wallet signature rejected for {}: {}", claimed_address, e);
                false
            }
        }
    }

    /// Verify and return the proven payment credential.
    pub fn try_verify(
        &self,
        claimed_address: &str,
        payload: &[u8],
        signature: &WalletSignature,
    ) -> Result<PaymentKeyHash, AuthError> {
        let key_bytes = hex::decode(signature.key.trim())
            .map_err(|_| AuthError::Malformed("public key hex".into()))?;
        let public_key = parse_cose_key(&key_bytes)?;

        let envelope_bytes = hex::decode(signature.signature.trim())
            .map_err(|_| AuthError::Malformed("signature hex".into()))?;
        let envelope = CoseSign1::from_bytes(&envelope_bytes)?;
        envelope.check_algorithm()?;

        if !constant_time_eq(&envelope.payload, payload) {
            return Err(AuthError::PayloadMismatch);
        }

        let signed = envelope.signed_bytes()?;
        let sig_array: [u8; 64] = envelope
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::InvalidSignature)?;
        let verifying_key =
            VerifyingKey::from_bytes(&public_key).map_err(|_| AuthError::InvalidPublicKey)?;
        verifying_key
            .verify(&signed, &Signature::from_bytes(&sig_array))
            .map_err(|_| AuthError::InvalidSignature)?;

        // Bind the key to the address even though the signature verified.
        let address_bytes = hex::decode(claimed_address.trim())
            .map_err(|_| AuthError::Malformed("address hex".into()))?;
        let credential =
            PaymentKeyHash::from_address_bytes(&address_bytes).ok_or(AuthError::AddressMismatch)?;
        let derived = PaymentKeyHash::from_public_key(&public_key);
        if !constant_time_eq(credential.as_bytes(), derived.as_bytes()) {
            return Err(AuthError::AddressMismatch);
        }

        Ok(derived)
    }
}

// =============================================================================
// TESTS
// =============================================================================
