//! Content Hashing and Digest Boundaries
//!
//! Provides the digests shared by every component:
//! - SHA-256 content addressing (commitments, merkle nodes, key derivation)
//! - Blake2b-224 payment credentials derived from wallet public keys
//! - Fixed-length hex parsing at every external boundary

use std::fmt;
use std::str::FromStr;

use blake2::digest::consts::U28;
use blake2::Blake2b;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Hash output type (256 bits / 32 bytes)
pub type Digest32 = [u8; 32];

/// Length of a payment credential in bytes.
pub const PAYMENT_KEY_HASH_LEN: usize = 28;

type Blake2b224 = Blake2b<U28>;

/// Errors raised when decoding digests from external input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// Input was not valid hex.
    #[error("invalid hex encoding")]
    InvalidHex,
    /// Decoded byte length differs from the fixed digest width.
    #[error("expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Required length in bytes.
        expected: usize,
        /// Length actually decoded.
        got: usize,
    },
}

/// Incremental SHA-256 hasher.
///
/// Order of updates is part of the digest definition.
pub struct ContentHasher {
    hasher: Sha256,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self { hasher: Sha256::new() }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u64 value (big-endian, fixed 8 bytes).
    #[inline]
    pub fn update_u64_be(&mut self, value: u64) {
        self.hasher.update(value.to_be_bytes());
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Digest32 {
        self.hasher.finalize().into()
    }
}

/// Compute the SHA-256 digest of arbitrary data.
pub fn sha256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 over the concatenation of several byte slices.
pub fn sha256_concat(parts: &[&[u8]]) -> Digest32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Decode a hex string into a fixed-size byte array.
pub fn decode_fixed_hex<const N: usize>(input: &str) -> Result<[u8; N], HashError> {
    let bytes = hex::decode(input.trim()).map_err(|_| HashError::InvalidHex)?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| HashError::InvalidLength { expected: N, got })
}

/// Parse a 64-char hex commitment digest.
pub fn digest_from_hex(input: &str) -> Result<Digest32, HashError> {
    decode_fixed_hex::<32>(input)
}

/// Compare two byte slices in constant time. Slices of different length
/// are unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Serde adapter for `[u8; N]` fields carried as hex strings.
pub mod serde_hex {
    use super::decode_fixed_hex;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Serialize bytes as lowercase hex.
    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize a fixed-width hex string.
    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_fixed_hex::<N>(&s).map_err(D::Error::custom)
    }
}

/// Payment credential: Blake2b-224 of an Ed25519 public key.
///
/// This is the account identifier embedded at bytes 1..29 of a wallet
/// address and the holder identity used for merkle leaves.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PaymentKeyHash(pub [u8; PAYMENT_KEY_HASH_LEN]);

impl PaymentKeyHash {
    /// Derive the credential from a raw public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut hasher = Blake2b224::new();
        hasher.update(public_key);
        Self(hasher.finalize().into())
    }

    /// Extract the payment credential slice from raw address bytes.
    ///
    /// Returns None when the address is too short to carry one.
    pub fn from_address_bytes(address: &[u8]) -> Option<Self> {
        let slice = address.get(1..1 + PAYMENT_KEY_HASH_LEN)?;
        let mut out = [0u8; PAYMENT_KEY_HASH_LEN];
        out.copy_from_slice(slice);
        Some(Self(out))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; PAYMENT_KEY_HASH_LEN] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PaymentKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentKeyHash({})", self.to_hex())
    }
}

impl fmt::Display for PaymentKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PaymentKeyHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed_hex::<PAYMENT_KEY_HASH_LEN>(s).map(Self)
    }
}

impl Serialize for PaymentKeyHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PaymentKeyHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// TESTS
// =============================================================================
