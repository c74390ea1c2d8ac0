//! Encryption Envelopes
//!
//! Wire form is a JSON object with hex fields. Parsing dispatches once on
//! `formatVersion` into a tagged enum; nothing downstream inspects fields
//! to guess which cipher produced the data.

use serde::{Deserialize, Serialize};

use super::error::EncryptionError;
use crate::core::hash::decode_fixed_hex;

/// Format version written on every new envelope.
pub const FORMAT_VERSION: &str = "2.0";

/// Algorithm identifier of the current AEAD path.
pub const ALGORITHM_ID: &str = "aes-256-gcm";

/// Algorithm identifier of the legacy block-cipher path.
pub const LEGACY_ALGORITHM_ID: &str = "aes-256-cbc";

/// Versions written before authenticated encryption.
const LEGACY_VERSIONS: &[&str] = &["1", "1.0"];

/// JSON representation as stored alongside a commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    /// Hex ciphertext.
    pub ciphertext: String,
    /// Hex IV / nonce.
    pub iv: String,
    /// Hex authentication tag (AEAD only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_tag: Option<String>,
    /// Algorithm identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm_id: Option<String>,
    /// Envelope format version; absent on legacy data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
}

/// AES-256-GCM envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentEnvelope {
    /// Ciphertext without the tag.
    pub ciphertext: Vec<u8>,
    /// 96-bit nonce.
    pub iv: [u8; 12],
    /// 128-bit authentication tag.
    pub auth_tag: [u8; 16],
}

/// AES-256-CBC envelope from before format 2.0. Read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyEnvelope {
    /// PKCS#7-padded ciphertext.
    pub ciphertext: Vec<u8>,
    /// 128-bit IV.
    pub iv: [u8; 16],
}

/// An encrypted payload of either generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub enum EncryptedEnvelope {
    /// Authenticated envelope (format 2.0).
    Current(CurrentEnvelope),
    /// Unauthenticated envelope kept for reading old data.
    Legacy(LegacyEnvelope),
}

impl EncryptedEnvelope {
    /// Parse the JSON wire form.
    pub fn from_json(json: &[u8]) -> Result<Self, EncryptionError> {
        let wire: WireEnvelope =
            serde_json::from_slice(json).map_err(|e| EncryptionError::Malformed(e.to_string()))?;
        Self::try_from(wire)
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<Vec<u8>, EncryptionError> {
        serde_json::to_vec(&WireEnvelope::from(self)).map_err(|e| EncryptionError::Malformed(e.to_string()))
    }

    /// True for envelopes produced by the current write path.
    pub fn is_current(&self) -> bool {
        matches!(self, Self::Current(_))
    }
}

fn hex_field(value: &str, name: &str) -> Result<Vec<u8>, EncryptionError> {
    hex::decode(value).map_err(|_| EncryptionError::Malformed(format!("{} is not hex", name)))
}

fn fixed_field<const N: usize>(value: &str, name: &str) -> Result<[u8; N], EncryptionError> {
    decode_fixed_hex::<N>(value).map_err(|e| EncryptionError::Malformed(format!("{}: {}", name, e)))
}

impl TryFrom<WireEnvelope> for EncryptedEnvelope {
    type Error = EncryptionError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        match wire.format_version.as_deref() {
            Some(FORMAT_VERSION) => {
                let tag = wire
                    .auth_tag
                    .as_deref()
                    .ok_or_else(|| EncryptionError::Malformed("authTag missing".into()))?;
                Ok(Self::Current(CurrentEnvelope {
                    ciphertext: hex_field(&wire.ciphertext, "ciphertext")?,
                    iv: fixed_field::<12>(&wire.iv, "iv")?,
                    auth_tag: fixed_field::<16>(tag, "authTag")?,
                }))
            }
            None => Ok(Self::Legacy(LegacyEnvelope {
                ciphertext: hex_field(&wire.ciphertext, "ciphertext")?,
                iv: fixed_field::<16>(&wire.iv, "iv")?,
            })),
            Some(v) if LEGACY_VERSIONS.contains(&v) => Ok(Self::Legacy(LegacyEnvelope {
                ciphertext: hex_field(&wire.ciphertext, "ciphertext")?,
                iv: fixed_field::<16>(&wire.iv, "iv")?,
            })),
            Some(other) => Err(EncryptionError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl From<EncryptedEnvelope> for WireEnvelope {
    fn from(envelope: EncryptedEnvelope) -> Self {
        WireEnvelope::from(&envelope)
    }
}

impl From<&EncryptedEnvelope> for WireEnvelope {
    fn from(envelope: &EncryptedEnvelope) -> Self {
        match envelope {
            EncryptedEnvelope::Current(env) => WireEnvelope {
                ciphertext: hex::encode(&env.ciphertext),
                iv: hex::encode(env.iv),
                auth_tag: Some(hex::encode(env.auth_tag)),
                algorithm_id: Some(ALGORITHM_ID.to_string()),
                format_version: Some(FORMAT_VERSION.to_string()),
            },
            EncryptedEnvelope::Legacy(env) => WireEnvelope {
                ciphertext: hex::encode(&env.ciphertext),
                iv: hex::encode(env.iv),
                auth_tag: None,
                algorithm_id: Some(LEGACY_ALGORITHM_ID.to_string()),
                format_version: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_wire_shape() {
        let env = EncryptedEnvelope::Current(CurrentEnvelope {
            ciphertext: vec![1, 2, 3],
            iv: [0xaa; 12],
            auth_tag: [0xbb; 16],
        });
        let json: serde_json::Value = serde_json::from_slice(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["formatVersion"], "2.0");
        assert_eq!(json["algorithmId"], ALGORITHM_ID);
        assert_eq!(json["iv"].as_str().unwrap().len(), 24);
        assert_eq!(json["authTag"].as_str().unwrap().len(), 32);
        assert_eq!(EncryptedEnvelope::from_json(json.to_string().as_bytes()).unwrap(), env);
    }

    #[test]
    fn test_missing_version_is_legacy() {
        let json = format!(r#"{{"ciphertext":"00ff","iv":"{}"}}"#, "11".repeat(16));
        let env = EncryptedEnvelope::from_json(json.as_bytes()).unwrap();
        assert!(matches!(env, EncryptedEnvelope::Legacy(_)));
        assert!(!env.is_current());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let json = r#"{"ciphertext":"00","iv":"00","formatVersion":"3.0"}"#;
        assert!(matches!(
            EncryptedEnvelope::from_json(json.as_bytes()),
            Err(EncryptionError::UnsupportedVersion(v)) if v == "3.0"
        ));
    }

    #[test]
    fn test_current_requires_tag_and_sized_iv() {
        let no_tag = format!(r#"{{"ciphertext":"00","iv":"{}","formatVersion":"2.0"}}"#, "11".repeat(12));
        assert!(matches!(
            EncryptedEnvelope::from_json(no_tag.as_bytes()),
            Err(EncryptionError::Malformed(_))
        ));

        let short_iv = format!(
            r#"{{"ciphertext":"00","iv":"{}","authTag":"{}","formatVersion":"2.0"}}"#,
            "11".repeat(8),
            "22".repeat(16)
        );
        assert!(matches!(
            EncryptedEnvelope::from_json(short_iv.as_bytes()),
            Err(EncryptionError::Malformed(_))
        ));
    }
}
