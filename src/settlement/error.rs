//! Settlement errors and their handling class.

use thiserror::Error;

use super::collaborators::CollaboratorError;
use super::state::OrchestratorState;
use crate::crypto::EncryptionError;
use crate::proof::CommitmentError;

/// How an error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected locally; never retried.
    MalformedInput,
    /// Signature, tag or preimage did not check out.
    CryptographicMismatch,
    /// Required key material is absent. Fatal at startup; see
    /// `ConfigError::kind`.
    MissingSecret,
    /// Referenced record does not exist. Reported, not retried.
    NotFound,
    /// Timeout or unavailable collaborator. Retried with backoff.
    Transient,
    /// Settlement already claimed or pool state disagrees.
    StateConflict,
}

/// Errors raised while settling a commitment.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// A collaborator call failed.
    #[error("{operation} failed: {source}")]
    Collaborator {
        /// Operation name.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: CollaboratorError,
    },

    /// A collaborator call exceeded the I/O timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// Operation name.
        operation: &'static str,
    },

    /// Payload could not be decrypted or parsed.
    #[error("payload decryption failed: {0}")]
    Decryption(#[from] EncryptionError),

    /// Decrypted payload does not open the commitment.
    #[error("commitment check failed: {0}")]
    Commitment(#[from] CommitmentError),

    /// Scorer returned a score outside [0, 1].
    #[error("invalid score {0}")]
    InvalidScore(f64),

    /// Another settlement for this commitment exists.
    #[error("commitment {0} already claimed")]
    AlreadyClaimed(String),

    /// Commitment failed terminally earlier and awaits reinstatement.
    #[error("commitment {0} is held after a terminal failure")]
    Held(String),

    /// Pool cannot cover the reward.
    #[error("reward pool holds {balance}, reward is {reward}")]
    InsufficientPool {
        /// Pool balance.
        balance: u64,
        /// Reward requested.
        reward: u64,
    },

    /// State machine rejected a transition.
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: OrchestratorState,
        /// Requested state.
        to: OrchestratorState,
    },

    /// Transaction could not be encoded.
    #[error("transaction encoding failed: {0}")]
    Encoding(String),

    /// Blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// Retries exhausted.
    #[error("settlement of {commitment_ref} escalated after {attempts} attempts: {last}")]
    Escalated {
        /// Commitment being settled.
        commitment_ref: String,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<SettlementError>,
    },
}

impl SettlementError {
    /// Handling class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Collaborator { source, .. } => source.kind(),
            Self::Timeout { .. } | Self::TaskFailed(_) => ErrorKind::Transient,
            Self::Decryption(EncryptionError::DecryptionFailed) => ErrorKind::CryptographicMismatch,
            Self::Decryption(_) => ErrorKind::MalformedInput,
            Self::Commitment(CommitmentError::AlreadyRevealed) => ErrorKind::StateConflict,
            Self::Commitment(CommitmentError::Encryption(EncryptionError::DecryptionFailed)) => {
                ErrorKind::CryptographicMismatch
            }
            Self::Commitment(CommitmentError::Encryption(_)) => ErrorKind::MalformedInput,
            Self::Commitment(CommitmentError::PreimageMismatch) => ErrorKind::CryptographicMismatch,
            Self::InvalidScore(_) | Self::Encoding(_) => ErrorKind::MalformedInput,
            Self::AlreadyClaimed(_)
            | Self::Held(_)
            | Self::InsufficientPool { .. }
            | Self::InvalidTransition { .. } => ErrorKind::StateConflict,
            Self::Escalated { last, .. } => last.kind(),
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Escalated { .. }) && self.kind() == ErrorKind::Transient
    }
}
