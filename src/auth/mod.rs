//! Wallet Authentication
//!
//! Challenge-response login: the server issues a nonce, the wallet signs a
//! fixed message over it, and the server verifies the Ed25519 signature and
//! binds the key to the claimed address.

pub mod challenge;
pub mod cose;
pub mod error;
pub mod login;
pub mod session;
pub mod verifier;

pub use challenge::{AuthChallenge, ChallengeStore, CHALLENGE_TTL_MS};
pub use error::AuthError;
pub use login::{LoginOutcome, LoginService};
pub use session::{issue_token, issue_token_at, validate_token, SessionClaims, SessionConfig};
pub use verifier::{SignatureVerifier, WalletSignature};
