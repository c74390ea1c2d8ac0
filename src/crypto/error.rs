//! Encryption errors.

use thiserror::Error;

/// Errors from the payload encryption service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    /// Envelope could not be parsed.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// Envelope declares a format this build cannot read.
    #[error("unsupported envelope format version {0}")]
    UnsupportedVersion(String),
    /// Tag mismatch, wrong key or corrupted ciphertext. Cause is not exposed.
    #[error("decryption failed")]
    DecryptionFailed,
    /// Encryption backend failure.
    #[error("encryption failed")]
    EncryptionFailed,
    /// Plaintext could not be (de)serialized.
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}
