//! Wallet Login Flow
//!
//! `begin` hands the client a challenge message to sign; `complete` consumes
//! the challenge, verifies the wallet signature and issues a session token.

use std::sync::{Mutex, PoisonError};

use tracing::{info, warn};

use super::challenge::{now_millis, ChallengeStore};
use super::error::AuthError;
use super::session::{issue_token, SessionConfig};
use super::verifier::{SignatureVerifier, WalletSignature};
use crate::core::hash::PaymentKeyHash;

/// Successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Payment credential proven by the signature.
    pub payment_key_hash: PaymentKeyHash,
    /// Session token for later requests.
    pub token: String,
}

/// Challenge issuance plus verification for wallet logins.
pub struct LoginService {
    verifier: SignatureVerifier,
    sessions: SessionConfig,
    challenges: Mutex<ChallengeStore>,
}

impl LoginService {
    /// Create a login service.
    pub fn new(verifier: SignatureVerifier, sessions: SessionConfig) -> Self {
        Self {
            verifier,
            sessions,
            challenges: Mutex::new(ChallengeStore::new()),
        }
    }

    /// Issue a challenge for `address` and return the message to sign.
    pub fn begin(&self, address: &str) -> String {
        let challenge = self.verifier.generate_challenge();
        let message = self.verifier.challenge_message(&challenge);
        let mut store = self.challenges.lock().unwrap_or_else(PoisonError::into_inner);
        store.purge_expired(now_millis());
        store.insert(address, challenge);
        message
    }

    /// Finish a login using the current clock.
    pub fn complete(&self, address: &str, signature: &WalletSignature) -> Result<LoginOutcome, AuthError> {
        self.complete_at(address, signature, now_millis())
    }

    /// Finish a login at an explicit time (unix millis).
    ///
    /// The challenge is consumed whether or not verification succeeds.
    pub fn complete_at(
        &self,
        address: &str,
        signature: &WalletSignature,
        now_ms: u64,
    ) -> Result<LoginOutcome, AuthError> {
        let challenge = {
            let mut store = self.challenges.lock().unwrap_or_else(PoisonError::into_inner);
            store.take(address, now_ms).ok_or(AuthError::ChallengeNotFound)?
        };

        let message = self.verifier.challenge_message(&challenge);
        let payment_key_hash = match self.verifier.try_verify(address, message.as_bytes(), signature) {
            Ok(pkh) => pkh,
            Err(e) => {
                warn!("Login rejected for {}: {}", address, e);
                return Err(e);
            }
        };

        let token = issue_token(address, payment_key_hash, &self.sessions)?;
        info!("Wallet {} authenticated", payment_key_hash);
        Ok(LoginOutcome { payment_key_hash, token })
    }

    /// Number of challenges awaiting a response.
    pub fn pending_challenges(&self) -> usize {
        self.challenges.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
