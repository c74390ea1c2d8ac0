//! Payload Confidentiality
//!
//! Prediction payloads stay encrypted until reveal. The service also
//! provides the content hash that commitments are built from.

pub mod encryption;
pub mod envelope;
pub mod error;

pub use encryption::{EncryptionKey, EncryptionService};
pub use envelope::{
    CurrentEnvelope, EncryptedEnvelope, LegacyEnvelope, WireEnvelope, ALGORITHM_ID, FORMAT_VERSION,
};
pub use error::EncryptionError;
