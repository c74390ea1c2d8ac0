//! Login Challenges
//!
//! Single-use nonces a wallet signs to prove key ownership.
//! A challenge expires five minutes after issuance and is discarded on use.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::core::hash::serde_hex;

/// Challenge lifetime in milliseconds.
pub const CHALLENGE_TTL_MS: u64 = 5 * 60 * 1000;

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Whether a challenge issued at `timestamp_ms` is expired at `now_ms`.
pub fn is_expired_at(timestamp_ms: u64, now_ms: u64) -> bool {
    now_ms.saturating_sub(timestamp_ms) > CHALLENGE_TTL_MS
}

/// A nonce and its issue time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// 32 random bytes.
    #[serde(with = "serde_hex")]
    pub nonce: [u8; 32],
    /// Issue time (unix millis).
    pub issued_at: u64,
}

impl AuthChallenge {
    /// Fresh challenge from the OS CSPRNG, stamped now.
    pub fn generate() -> Self {
        let mut nonce = [0u8; 32];
        OsRng.fill_bytes(&mut nonce);
        Self::at(nonce, now_millis())
    }

    /// Challenge with explicit nonce and time.
    pub fn at(nonce: [u8; 32], issued_at: u64) -> Self {
        Self { nonce, issued_at }
    }

    /// Hex form of the nonce.
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce)
    }

    /// The exact message the wallet is asked to sign.
    pub fn message(&self, app_name: &str) -> String {
        format!(
            "{} Authentication\nNonce: {}\nTimestamp: {}",
            app_name,
            self.nonce_hex(),
            self.issued_at
        )
    }

    /// Check expiry against a given clock.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        is_expired_at(self.issued_at, now_ms)
    }
}

/// Outstanding challenges keyed by claimed address.
///
/// One challenge per address; issuing again replaces the previous one.
#[derive(Debug, Default)]
pub struct ChallengeStore {
    pending: BTreeMap<String, AuthChallenge>,
}

impl ChallengeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a challenge for an address.
    pub fn insert(&mut self, address: &str, challenge: AuthChallenge) {
        self.pending.insert(address.to_string(), challenge);
    }

    /// Remove and return the challenge for an address.
    ///
    /// Expired challenges are discarded and reported as absent.
    pub fn take(&mut self, address: &str, now_ms: u64) -> Option<AuthChallenge> {
        let challenge = self.pending.remove(address)?;
        if challenge.is_expired_at(now_ms) {
            return None;
        }
        Some(challenge)
    }

    /// Drop every expired challenge. Returns how many were removed.
    pub fn purge_expired(&mut self, now_ms: u64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, c| !c.is_expired_at(now_ms));
        before - self.pending.len()
    }

    /// Number of outstanding challenges.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when no challenge is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
