//! # Cognosis Oracle Core
//!
//! Commit-reveal prediction oracle with wallet authentication, encrypted
//! payloads, merkle reward proofs and on-chain settlement.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    COGNOSIS ORACLE                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                        │
//! │  ├── hash.rs     - SHA-256 / Blake2b-224 digests, hex       │
//! │  └── config.rs   - Environment config, service context      │
//! │                                                             │
//! │  auth/           - Wallet login                             │
//! │  ├── cose.rs     - COSE_Sign1 / COSE_Key decoding           │
//! │  ├── verifier.rs - Ed25519 + address binding                │
//! │  ├── challenge.rs- Single-use nonces                        │
//! │  ├── session.rs  - HS256 session tokens                     │
//! │  └── login.rs    - Begin / complete flow                    │
//! │                                                             │
//! │  crypto/         - Payload confidentiality                  │
//! │  ├── envelope.rs - Versioned envelope wire format           │
//! │  └── encryption.rs - AES-256-GCM (CBC read-only)            │
//! │                                                             │
//! │  proof/          - Commitments and reward proofs            │
//! │  ├── commitment.rs - Commit / reveal binding                │
//! │  ├── merkle.rs   - Holder tree and inclusion proofs         │
//! │  └── snapshot.rs - Period snapshots, accrual carry-over     │
//! │                                                             │
//! │  rewards/        - Reward computation                       │
//! │  ├── curve.rs    - Accuracy → tokens                        │
//! │  └── lottery.rs  - Ticket weighting, winner selection       │
//! │                                                             │
//! │  settlement/     - Reveal orchestration                     │
//! │  └── orchestrator.rs - Poll, score, build, submit           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Merkle roots, commitment hashes, ticket counts, rewards and settlement
//! transaction ids are pure functions of their inputs. Only nonces, IVs and
//! off-chain lottery seeds draw from the OS CSPRNG.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod auth;
pub mod core;
pub mod crypto;
pub mod proof;
pub mod rewards;
pub mod settlement;

// Re-export commonly used types
pub use auth::{LoginService, SignatureVerifier, WalletSignature};
pub use crate::core::config::{AppConfig, ConfigError, ServiceContext};
pub use crate::core::hash::{Digest32, PaymentKeyHash};
pub use crypto::{EncryptedEnvelope, EncryptionService};
pub use proof::{Commitment, HolderBalance, MerkleProof, MerkleTree, RewardSnapshot};
pub use rewards::{reward, LotteryEngine, RewardCurveParams, SelectionPolicy};
pub use settlement::{RevealOrchestrator, SettlementError, SettlementTx};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
