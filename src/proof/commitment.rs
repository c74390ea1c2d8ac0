//! Prediction Commitments
//!
//! A participant commits to a prediction before the target is known.
//! The commitment hash binds the prediction to a secret nonce and the
//! experiment metadata; the prediction itself is stored encrypted until
//! reveal.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::hash::{constant_time_eq, serde_hex, sha256, ContentHasher, Digest32};
use crate::crypto::{EncryptedEnvelope, EncryptionError, EncryptionService};

/// Compute commitment hash: sha256(prediction ‖ nonce ‖ metadata_hash).
pub fn compute_commitment_hash(prediction: &[u8], nonce: &[u8], metadata_hash: &Digest32) -> Digest32 {
    let mut hasher = ContentHasher::new();
    hasher.update_bytes(prediction);
    hasher.update_bytes(nonce);
    hasher.update_bytes(metadata_hash);
    hasher.finalize()
}

/// Plaintext sealed inside a commitment's encrypted payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionPayload {
    /// The participant's prediction.
    pub prediction: String,
    /// Secret commitment nonce.
    #[serde(with = "serde_hex")]
    pub nonce: [u8; 32],
    /// Hash of the experiment metadata.
    #[serde(with = "serde_hex")]
    pub metadata_hash: Digest32,
}

impl PredictionPayload {
    /// Commitment hash this payload opens.
    pub fn commitment_hash(&self) -> Digest32 {
        compute_commitment_hash(self.prediction.as_bytes(), &self.nonce, &self.metadata_hash)
    }

    /// Whether this payload opens `commitment_hash`.
    pub fn opens(&self, commitment_hash: &Digest32) -> bool {
        constant_time_eq(&self.commitment_hash(), commitment_hash)
    }
}

/// Outcome recorded once a commitment is revealed and settled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRefs {
    /// Settlement transaction id (hex).
    pub settlement_tx_id: String,
    /// Accuracy percent reported by the scorer.
    pub accuracy: f64,
    /// Tokens paid for this commitment.
    pub reward: u64,
    /// When the reveal was recorded.
    pub revealed_at: DateTime<Utc>,
}

/// A committed prediction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    /// Record id.
    pub id: Uuid,
    /// Owner reference (wallet address or user id).
    pub owner_ref: String,
    /// Binding digest, fixed at creation.
    #[serde(with = "serde_hex")]
    pub commitment_hash: Digest32,
    /// Secret nonce.
    #[serde(with = "serde_hex")]
    pub nonce: [u8; 32],
    /// Hash of the experiment metadata.
    #[serde(with = "serde_hex")]
    pub metadata_hash: Digest32,
    /// Encrypted `PredictionPayload`.
    pub encrypted_payload: EncryptedEnvelope,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set once the reveal has settled.
    pub revealed: bool,
    /// Reveal outcome.
    pub reveal: Option<RevealRefs>,
}

/// Errors from creating or revealing commitments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitmentError {
    /// Payload could not be sealed or opened.
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    /// Revealed prediction does not hash to the commitment.
    #[error("preimage does not match commitment")]
    PreimageMismatch,
    /// Commitment was already revealed.
    #[error("commitment already revealed")]
    AlreadyRevealed,
}

impl Commitment {
    /// Commit to a prediction, sealing it under the service key.
    pub fn seal(
        owner_ref: impl Into<String>,
        prediction: &str,
        metadata: &[u8],
        encryption: &EncryptionService,
    ) -> Result<(Self, PredictionPayload), CommitmentError> {
        let mut nonce = [0u8; 32];
        OsRng.fill_bytes(&mut nonce);

        let payload = PredictionPayload {
            prediction: prediction.to_string(),
            nonce,
            metadata_hash: sha256(metadata),
        };
        let encrypted_payload = encryption.encrypt_json(&payload, None)?;

        let commitment = Self {
            id: Uuid::new_v4(),
            owner_ref: owner_ref.into(),
            commitment_hash: payload.commitment_hash(),
            nonce,
            metadata_hash: payload.metadata_hash,
            encrypted_payload,
            created_at: Utc::now(),
            revealed: false,
            reveal: None,
        };
        Ok((commitment, payload))
    }

    /// Hex form of the commitment hash (64 chars).
    pub fn commitment_hash_hex(&self) -> String {
        hex::encode(self.commitment_hash)
    }

    /// Check a revealed prediction and nonce against this commitment.
    pub fn verify_reveal(&self, prediction: &str, nonce: &[u8; 32]) -> bool {
        let computed = compute_commitment_hash(prediction.as_bytes(), nonce, &self.metadata_hash);
        constant_time_eq(&computed, &self.commitment_hash)
    }

    /// Decrypt the payload and check it opens this commitment.
    pub fn open(&self, encryption: &EncryptionService) -> Result<PredictionPayload, CommitmentError> {
        let payload: PredictionPayload = encryption.decrypt_json(&self.encrypted_payload, None)?;
        if !payload.opens(&self.commitment_hash) {
            return Err(CommitmentError::PreimageMismatch);
        }
        Ok(payload)
    }

    /// Record the reveal outcome. The commitment hash is left untouched.
    pub fn mark_revealed(&mut self, refs: RevealRefs) -> Result<(), CommitmentError> {
        if self.revealed {
            return Err(CommitmentError::AlreadyRevealed);
        }
        self.revealed = true;
        self.reveal = Some(refs);
        Ok(())
    }
}
