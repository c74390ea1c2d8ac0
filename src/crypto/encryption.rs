//! Payload Encryption Service
//!
//! Seals prediction payloads with AES-256-GCM under a key derived from
//! process-wide key material. New writes always use the AEAD path; the
//! AES-256-CBC path exists only to read envelopes written before format 2.0.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::envelope::{CurrentEnvelope, EncryptedEnvelope, LegacyEnvelope};
use super::error::EncryptionError;
use crate::core::hash::{constant_time_eq, digest_from_hex, sha256, Digest32};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-GCM tag length in bytes.
const TAG_LEN: usize = 16;

/// A 256-bit symmetric key.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Derive a key by hashing arbitrary key material to 32 bytes.
    pub fn derive(material: &[u8]) -> Self {
        Self(sha256(material))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Encrypts, decrypts and content-hashes payloads.
#[derive(Clone, Debug)]
pub struct EncryptionService {
    default_key: EncryptionKey,
}

impl EncryptionService {
    /// Create a service over the given key material.
    pub fn new(key_material: &[u8]) -> Self {
        Self {
            default_key: EncryptionKey::derive(key_material),
        }
    }

    /// Generate fresh random key material (hex, 32 bytes).
    pub fn generate_key() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }

    /// Encrypt with the default key, or `key` when given.
    pub fn encrypt(&self, data: &[u8], key: Option<&EncryptionKey>) -> Result<EncryptedEnvelope, EncryptionError> {
        let key = key.unwrap_or(&self.default_key);
        let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| EncryptionError::EncryptionFailed)?;

        let mut iv = [0u8; 12];
        OsRng.fill_bytes(&mut iv);

        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&iv), data)
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        // aes-gcm appends the tag to the ciphertext
        let split = sealed.len() - TAG_LEN;
        let mut auth_tag = [0u8; TAG_LEN];
        auth_tag.copy_from_slice(&sealed[split..]);
        sealed.truncate(split);

        Ok(EncryptedEnvelope::Current(CurrentEnvelope {
            ciphertext: sealed,
            iv,
            auth_tag,
        }))
    }

    /// Decrypt an envelope of either generation.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope, key: Option<&EncryptionKey>) -> Result<Vec<u8>, EncryptionError> {
        let key = key.unwrap_or(&self.default_key);
        match envelope {
            EncryptedEnvelope::Current(env) => decrypt_current(env, key),
            EncryptedEnvelope::Legacy(env) => decrypt_legacy(env, key),
        }
    }

    /// Serialize a value as JSON and encrypt it.
    pub fn encrypt_json<T: Serialize>(&self, value: &T, key: Option<&EncryptionKey>) -> Result<EncryptedEnvelope, EncryptionError> {
        let bytes = serde_json::to_vec(value).map_err(|e| EncryptionError::Serialization(e.to_string()))?;
        self.encrypt(&bytes, key)
    }

    /// Decrypt an envelope and parse the plaintext as JSON.
    pub fn decrypt_json<T: DeserializeOwned>(&self, envelope: &EncryptedEnvelope, key: Option<&EncryptionKey>) -> Result<T, EncryptionError> {
        let bytes = self.decrypt(envelope, key)?;
        serde_json::from_slice(&bytes).map_err(|e| EncryptionError::Serialization(e.to_string()))
    }

    /// Content-addressing digest.
    pub fn hash(&self, data: &[u8]) -> Digest32 {
        sha256(data)
    }

    /// Check data against a hex digest. Malformed digests never match.
    pub fn verify_hash(&self, data: &[u8], expected_hex: &str) -> bool {
        match digest_from_hex(expected_hex) {
            Ok(expected) => constant_time_eq(&self.hash(data), &expected),
            Err(_) => false,
        }
    }
}

fn decrypt_current(env: &CurrentEnvelope, key: &EncryptionKey) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| EncryptionError::DecryptionFailed)?;
    let mut sealed = Vec::with_capacity(env.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&env.ciphertext);
    sealed.extend_from_slice(&env.auth_tag);
    cipher
        .decrypt(Nonce::from_slice(&env.iv), sealed.as_slice())
        .map_err(|_| EncryptionError::DecryptionFailed)
}

fn decrypt_legacy(env: &LegacyEnvelope, key: &EncryptionKey) -> Result<Vec<u8>, EncryptionError> {
    Aes256CbcDec::new_from_slices(&key.0, &env.iv)
        .map_err(|_| EncryptionError::DecryptionFailed)?
        .decrypt_padded_vec_mut::<Pkcs7>(&env.ciphertext)
        .map_err(|_| EncryptionError::DecryptionFailed)
}

// =============================================================================
// TESTS
// =============================================================================
