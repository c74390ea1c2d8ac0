//! Commitments and Reward Proofs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF LAYER                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs   - Prediction commit / reveal binding       │
//! │  merkle.rs       - Holder balance tree and inclusion proofs │
//! │  snapshot.rs     - Period snapshots and accrual carry-over  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod merkle;
pub mod snapshot;

// Re-export key types
pub use commitment::{compute_commitment_hash, Commitment, CommitmentError, PredictionPayload, RevealRefs};
pub use merkle::{compute_root, HolderBalance, MerkleError, MerkleProof, MerkleTree, ProofStep, SiblingSide};
pub use snapshot::{
    AccrualLedger, CarryForwardPolicy, PeriodSettlement, RewardClaim, RewardSnapshot,
};
