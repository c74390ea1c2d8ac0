//! External collaborators the orchestrator drives.
//!
//! Chain state, payload storage, scoring and transaction submission all
//! live outside this crate. Each is a trait object so deployments and
//! tests can plug in their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::ErrorKind;
use super::transaction::{RewardPoolState, SettlementTx};
use crate::core::hash::{serde_hex, Digest32, PaymentKeyHash};
use crate::crypto::EncryptedEnvelope;

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Service unreachable or overloaded.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Request rejected as invalid.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Chain state moved underneath the request.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl CollaboratorError {
    /// Handling class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::Transient,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Rejected(_) => ErrorKind::MalformedInput,
            Self::Conflict(_) => ErrorKind::StateConflict,
        }
    }
}

/// An unrevealed commitment as seen on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCommitment {
    /// On-chain reference to the commitment record.
    pub commitment_ref: String,
    /// Digest the reveal must open.
    #[serde(with = "serde_hex")]
    pub commitment_hash: Digest32,
    /// Participant credential that receives the payout.
    pub owner: PaymentKeyHash,
    /// Content-store key of the encrypted payload.
    pub content_id: String,
    /// Ground-truth target reference.
    pub target_ref: String,
    /// When the commitment becomes eligible for reveal.
    pub matures_at: DateTime<Utc>,
}

/// Request sent to the scorer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRequest {
    /// Commitment digest (hex).
    pub commitment_hash: String,
    /// Content-store key.
    pub content_id: String,
    /// Ground-truth target reference.
    pub target_ref: String,
    /// Revealed prediction text.
    pub response: String,
}

/// Scorer verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResponse {
    /// Score in [0, 1].
    pub score: f64,
    /// Scoring method identifier.
    pub method: String,
    /// Hash of the scoring module that produced the score.
    pub scoring_module_hash: String,
}

impl ScoringResponse {
    /// Accuracy percentage (score × 100).
    pub fn accuracy(&self) -> f64 {
        self.score * 100.0
    }
}

/// Read access to commitment and pool records on chain.
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Unrevealed commitments matured at or before `now`.
    async fn pending_commitments(&self, now: DateTime<Utc>) -> Result<Vec<PendingCommitment>, CollaboratorError>;

    /// Current shared reward pool.
    async fn reward_pool(&self) -> Result<RewardPoolState, CollaboratorError>;

    /// Whether `commitment_ref` still awaits settlement.
    ///
    /// Must reflect every transaction the submitter has accepted.
    async fn is_pending(&self, commitment_ref: &str) -> Result<bool, CollaboratorError> {
        Ok(self
            .pending_commitments(Utc::now())
            .await?
            .iter()
            .any(|p| p.commitment_ref == commitment_ref))
    }
}

/// Storage for encrypted prediction payloads.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the envelope stored under `content_id`.
    async fn fetch(&self, content_id: &str) -> Result<EncryptedEnvelope, CollaboratorError>;
}

/// External accuracy assessor.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score a revealed prediction against its target.
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, CollaboratorError>;
}

/// Signs and submits settlement transactions.
///
/// Submitting a transaction id that was already accepted must succeed
/// without effect. `Conflict` means an input of the transaction is already
/// spent and it can never be accepted.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Submit `tx`.
    async fn submit(&self, tx: &SettlementTx) -> Result<(), CollaboratorError>;
}
