//! Exclusive settlement claims.
//!
//! A commitment may have at most one settlement in flight. The transaction
//! built for it is recorded here and later attempts re-submit it unchanged,
//! until the chain shows its pool input spent and a rebuild supersedes it.
//!
//! Commitments that escalate or fail permanently are held and skipped by
//! later polls until an operator reinstates them.

use std::collections::BTreeMap;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::{ErrorKind, SettlementError};
use super::transaction::SettlementTx;

#[derive(Debug, Clone)]
enum ClaimState {
    /// A task is settling this commitment.
    InFlight { built: Option<SettlementTx> },
    /// Reinstated after a hold; the built transaction awaits re-submission.
    Parked { built: SettlementTx },
    /// Escalated or rejected; no task may claim it.
    Held {
        kind: ErrorKind,
        built: Option<SettlementTx>,
    },
    /// Accepted by the submitter.
    Settled { tx_id: String },
}

/// Granted claim.
#[derive(Debug, Clone)]
pub struct Claim {
    /// Transaction built by an earlier attempt, if any.
    pub built: Option<SettlementTx>,
}

/// Registry of commitment claims.
#[derive(Debug, Default)]
pub struct ClaimRegistry {
    claims: Mutex<BTreeMap<String, ClaimState>>,
}

impl ClaimRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `commitment_ref` for settlement.
    ///
    /// Fails with `AlreadyClaimed` while another task holds it or once it
    /// has settled, and with `Held` after a terminal failure.
    pub async fn try_claim(&self, commitment_ref: &str) -> Result<Claim, SettlementError> {
        let mut claims = self.claims.lock().await;
        let built = match claims.get(commitment_ref) {
            Some(ClaimState::InFlight { .. }) | Some(ClaimState::Settled { .. }) => {
                return Err(SettlementError::AlreadyClaimed(commitment_ref.to_string()));
            }
            Some(ClaimState::Held { .. }) => {
                return Err(SettlementError::Held(commitment_ref.to_string()));
            }
            Some(ClaimState::Parked { built }) => Some(built.clone()),
            None => None,
        };
        claims.insert(
            commitment_ref.to_string(),
            ClaimState::InFlight { built: built.clone() },
        );
        debug!(commitment = commitment_ref, resubmit = built.is_some(), "Claimed");
        Ok(Claim { built })
    }

    /// Record the transaction built for an in-flight claim.
    ///
    /// The first recorded transaction is kept.
    pub async fn record_built(&self, commitment_ref: &str, tx: &SettlementTx) {
        let mut claims = self.claims.lock().await;
        if let Some(ClaimState::InFlight { built }) = claims.get_mut(commitment_ref) {
            if built.is_none() {
                *built = Some(tx.clone());
            }
        }
    }

    /// Replace the recorded transaction after its pool input was spent.
    pub async fn supersede_built(&self, commitment_ref: &str, tx: &SettlementTx) {
        let mut claims = self.claims.lock().await;
        if let Some(ClaimState::InFlight { built }) = claims.get_mut(commitment_ref) {
            *built = Some(tx.clone());
        }
    }

    /// Transaction recorded for `commitment_ref`, if any.
    pub async fn built_tx(&self, commitment_ref: &str) -> Option<SettlementTx> {
        let claims = self.claims.lock().await;
        match claims.get(commitment_ref) {
            Some(ClaimState::InFlight { built }) | Some(ClaimState::Held { built, .. }) => built.clone(),
            Some(ClaimState::Parked { built }) => Some(built.clone()),
            _ => None,
        }
    }

    /// Mark the claim settled.
    pub async fn mark_settled(&self, commitment_ref: &str, tx_id: String) {
        let mut claims = self.claims.lock().await;
        claims.insert(commitment_ref.to_string(), ClaimState::Settled { tx_id });
    }

    /// Hold an in-flight claim after a terminal failure of class `kind`.
    pub async fn hold(&self, commitment_ref: &str, kind: ErrorKind) {
        let mut claims = self.claims.lock().await;
        if let Some(ClaimState::InFlight { built }) = claims.get_mut(commitment_ref) {
            let built = built.take();
            claims.insert(commitment_ref.to_string(), ClaimState::Held { kind, built });
        }
    }

    /// Release a held commitment so the next poll settles it again.
    ///
    /// Returns false when `commitment_ref` is not held.
    pub async fn reinstate(&self, commitment_ref: &str) -> bool {
        let mut claims = self.claims.lock().await;
        match claims.remove(commitment_ref) {
            Some(ClaimState::Held { built, kind }) => {
                if let Some(built) = built {
                    claims.insert(commitment_ref.to_string(), ClaimState::Parked { built });
                }
                info!(commitment = commitment_ref, ?kind, "Reinstated held commitment");
                true
            }
            Some(other) => {
                claims.insert(commitment_ref.to_string(), other);
                false
            }
            None => false,
        }
    }

    /// Whether `commitment_ref` has settled.
    pub async fn is_settled(&self, commitment_ref: &str) -> bool {
        matches!(
            self.claims.lock().await.get(commitment_ref),
            Some(ClaimState::Settled { .. })
        )
    }

    /// Failure class of a held commitment.
    pub async fn held_kind(&self, commitment_ref: &str) -> Option<ErrorKind> {
        match self.claims.lock().await.get(commitment_ref) {
            Some(ClaimState::Held { kind, .. }) => Some(*kind),
            _ => None,
        }
    }

    /// Settled transaction id for `commitment_ref`.
    pub async fn settled_tx_id(&self, commitment_ref: &str) -> Option<String> {
        match self.claims.lock().await.get(commitment_ref) {
            Some(ClaimState::Settled { tx_id }) => Some(tx_id.clone()),
            _ => None,
        }
    }

    /// Drop settled entries the chain no longer reports as pending.
    ///
    /// Returns the number of entries removed.
    pub async fn prune_settled<F>(&self, still_pending: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut claims = self.claims.lock().await;
        let before = claims.len();
        claims.retain(|commitment_ref, state| {
            !matches!(state, ClaimState::Settled { .. }) || still_pending(commitment_ref)
        });
        before - claims.len()
    }

    /// Number of tracked commitments.
    pub async fn len(&self) -> usize {
        self.claims.lock().await.len()
    }

    /// Whether no commitment is tracked.
    pub async fn is_empty(&self) -> bool {
        self.claims.lock().await.is_empty()
    }
}
