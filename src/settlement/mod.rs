//! Reveal and Settlement
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SETTLEMENT                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  orchestrator.rs  - Poll / settle loop                      │
//! │  state.rs         - Pipeline state machine                  │
//! │  transaction.rs   - Settlement transaction construction     │
//! │  claims.rs        - At-most-once settlement per commitment  │
//! │  retry.rs         - Capped exponential backoff              │
//! │  collaborators.rs - Chain, storage, scorer, submitter seams │
//! │  error.rs         - Error taxonomy                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod claims;
pub mod collaborators;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod state;
pub mod transaction;

pub use claims::{Claim, ClaimRegistry};
pub use collaborators::{
    ChainState, CollaboratorError, ContentStore, PendingCommitment, Scorer, ScoringRequest, ScoringResponse,
    TxSubmitter,
};
pub use error::{ErrorKind, SettlementError};
pub use orchestrator::{Collaborators, IterationReport, OrchestratorConfig, RevealOrchestrator, SettlementOutcome};
pub use retry::RetryPolicy;
pub use state::{OrchestratorState, StateTracker};
pub use transaction::{
    build_settlement, RewardPoolState, SettlementInputs, SettlementOutputs, SettlementParams, SettlementTx,
};
