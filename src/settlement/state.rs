//! Settlement state machine.
//!
//! ```text
//! Idle → Polling → Found → Scoring → RewardComputed → TxBuilding → Submitted → Idle
//!                    │        │                           │
//!                    │        └──────────► Failed ◄───────┘
//!                    │                       │
//!                    └──── TxBuilding        └──► Polling (retry) / Idle (escalated)
//! ```
//!
//! `Found → TxBuilding` is taken only when a transaction was already built
//! for the commitment and is being re-submitted.

use tracing::debug;

use super::error::SettlementError;

/// Orchestrator pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Waiting for the next poll.
    Idle,
    /// Querying chain state.
    Polling,
    /// A matured commitment is being processed.
    Found,
    /// Fetching, decrypting and scoring the payload.
    Scoring,
    /// Reward determined.
    RewardComputed,
    /// Building and submitting the settlement transaction.
    TxBuilding,
    /// Handed off to the submitter.
    Submitted,
    /// Step failed.
    Failed,
}

impl OrchestratorState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;
        matches!(
            (self, next),
            (Idle, Polling)
                | (Polling, Found)
                | (Polling, Idle)
                | (Found, Scoring)
                | (Found, TxBuilding)
                | (Scoring, RewardComputed)
                | (Scoring, Failed)
                | (RewardComputed, TxBuilding)
                | (TxBuilding, Submitted)
                | (TxBuilding, Failed)
                | (Submitted, Idle)
                | (Failed, Polling)
                | (Failed, Idle)
        )
    }
}

/// Tracks one commitment's path through the state machine.
#[derive(Debug, Clone)]
pub struct StateTracker {
    commitment_ref: String,
    current: OrchestratorState,
    history: Vec<OrchestratorState>,
}

impl StateTracker {
    /// Start in `Idle`.
    pub fn new(commitment_ref: impl Into<String>) -> Self {
        Self {
            commitment_ref: commitment_ref.into(),
            current: OrchestratorState::Idle,
            history: vec![OrchestratorState::Idle],
        }
    }

    /// Current state.
    pub fn current(&self) -> OrchestratorState {
        self.current
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[OrchestratorState] {
        &self.history
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn advance(&mut self, next: OrchestratorState) -> Result<(), SettlementError> {
        if !self.current.can_transition_to(next) {
            return Err(SettlementError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        debug!(commitment = %self.commitment_ref, from = ?self.current, to = ?next, "State transition");
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `Failed` from wherever the failure happened.
    ///
    /// Failures before `Scoring` are recorded against `Scoring`.
    pub fn fail(&mut self) {
        if self.current == OrchestratorState::Found {
            self.current = OrchestratorState::Scoring;
            self.history.push(OrchestratorState::Scoring);
        }
        if self.current.can_transition_to(OrchestratorState::Failed) {
            self.current = OrchestratorState::Failed;
            self.history.push(OrchestratorState::Failed);
        }
    }
}
