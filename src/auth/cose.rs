//! COSE Structures for Wallet Signatures
//!
//! Wallets return a `COSE_Key` carrying the Ed25519 public key and a
//! `COSE_Sign1` envelope over the signed message. Both are CBOR.
//! Parsing is strict: anything unexpected is rejected.

use ciborium::value::{Integer, Value};

use super::error::AuthError;

/// COSE header label for the algorithm.
const LABEL_ALG: i64 = 1;
/// COSE_Key label for the public key bytes.
const LABEL_OKP_X: i64 = -2;
/// COSE algorithm identifier for EdDSA.
const ALG_EDDSA: i64 = -8;
/// COSE_Sign1 CBOR tag.
const TAG_SIGN1: u64 = 18;
/// Signature context string for single-signer envelopes.
const SIGN1_CONTEXT: &str = "Signature1";

fn decode_value(bytes: &[u8]) -> Result<Value, AuthError> {
    ciborium::de::from_reader(bytes).map_err(|e| AuthError::Malformed(e.to_string()))
}

fn encode_value(value: &Value) -> Result<Vec<u8>, AuthError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| AuthError::Malformed(e.to_string()))?;
    Ok(out)
}

fn is_label(value: &Value, label: i64) -> bool {
    matches!(value, Value::Integer(i) if i128::from(*i) == label as i128)
}

fn int(value: i64) -> Value {
    Value::Integer(Integer::from(value))
}

/// Extract the 32-byte Ed25519 key from a CBOR `COSE_Key`.
pub fn parse_cose_key(bytes: &[u8]) -> Result<[u8; 32], AuthError> {
    let entries = match decode_value(bytes)? {
        Value::Map(entries) => entries,
        _ => return Err(AuthError::InvalidPublicKey),
    };

    let x = entries
        .iter()
        .find(|(k, _)| is_label(k, LABEL_OKP_X))
        .map(|(_, v)| v)
        .ok_or(AuthError::InvalidPublicKey)?;

    match x {
        Value::Bytes(raw) => raw
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::InvalidPublicKey),
        _ => Err(AuthError::InvalidPublicKey),
    }
}

/// Encode an Ed25519 public key as a CBOR `COSE_Key` (OKP / Ed25519).
pub fn encode_cose_key(public_key: &[u8; 32]) -> Result<Vec<u8>, AuthError> {
    encode_value(&Value::Map(vec![
        (int(1), int(1)),
        (int(3), int(ALG_EDDSA)),
        (int(-1), int(6)),
        (int(LABEL_OKP_X), Value::Bytes(public_key.to_vec())),
    ]))
}

/// A parsed `COSE_Sign1` envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct CoseSign1 {
    /// Serialized protected header map (signed as-is).
    pub protected: Vec<u8>,
    /// Unprotected header map (not covered by the signature).
    pub unprotected: Value,
    /// Signed payload.
    pub payload: Vec<u8>,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

impl CoseSign1 {
    /// Parse CBOR bytes, accepting the optional tag 18 wrapper.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AuthError> {
        let value = match decode_value(bytes)? {
            Value::Tag(TAG_SIGN1, inner) => *inner,
            Value::Tag(_, _) => return Err(AuthError::InvalidEnvelope),
            other => other,
        };

        let items = match value {
            Value::Array(items) if items.len() == 4 => items,
            _ => return Err(AuthError::InvalidEnvelope),
        };

        let mut items = items.into_iter();
        let (protected, unprotected, payload, signature) =
            match (items.next(), items.next(), items.next(), items.next()) {
                (
                    Some(Value::Bytes(protected)),
                    Some(unprotected @ Value::Map(_)),
                    Some(Value::Bytes(payload)),
                    Some(Value::Bytes(signature)),
                ) => (protected, unprotected, payload, signature),
                _ => return Err(AuthError::InvalidEnvelope),
            };

        Ok(Self { protected, unprotected, payload, signature })
    }

    /// Build an envelope from its parts (signature filled in later).
    pub fn new(protected: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            protected,
            unprotected: Value::Map(vec![(Value::Text("hashed".into()), Value::Bool(false))]),
            payload,
            signature: Vec::new(),
        }
    }

    /// Serialized protected header declaring EdDSA and the signing address.
    pub fn protected_header(address: &[u8]) -> Result<Vec<u8>, AuthError> {
        encode_value(&Value::Map(vec![
            (int(LABEL_ALG), int(ALG_EDDSA)),
            (Value::Text("address".into()), Value::Bytes(address.to_vec())),
        ]))
    }

    /// Reject protected headers that name a non-EdDSA algorithm.
    ///
    /// An empty protected header is accepted.
    pub fn check_algorithm(&self) -> Result<(), AuthError> {
        if self.protected.is_empty() {
            return Ok(());
        }
        let entries = match decode_value(&self.protected)? {
            Value::Map(entries) => entries,
            _ => return Err(AuthError::InvalidEnvelope),
        };
        match entries.iter().find(|(k, _)| is_label(k, LABEL_ALG)) {
            None => Ok(()),
            Some((_, v)) if is_label(v, ALG_EDDSA) => Ok(()),
            Some(_) => Err(AuthError::UnsupportedAlgorithm),
        }
    }

    /// Canonical bytes covered by the signature:
    /// `["Signature1", protected, h'', payload]`.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, AuthError> {
        encode_value(&Value::Array(vec![
            Value::Text(SIGN1_CONTEXT.into()),
            Value::Bytes(self.protected.clone()),
            Value::Bytes(Vec::new()),
            Value::Bytes(self.payload.clone()),
        ]))
    }

    /// Serialize as an untagged 4-element CBOR array.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AuthError> {
        encode_value(&Value::Array(vec![
            Value::Bytes(self.protected.clone()),
            self.unprotected.clone(),
            Value::Bytes(self.payload.clone()),
            Value::Bytes(self.signature.clone()),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cose_key_roundtrip() {
        let key = [7u8; 32];
        let encoded = encode_cose_key(&key).unwrap();
        assert_eq!(parse_cose_key(&encoded).unwrap(), key);
    }

    #[test]
    fn test_cose_key_wrong_length_rejected() {
        let encoded = encode_value(&Value::Map(vec![(int(-2), Value::Bytes(vec![1; 31]))])).unwrap();
        assert_eq!(parse_cose_key(&encoded), Err(AuthError::InvalidPublicKey));
    }

    #[test]
    fn test_cose_key_garbage_rejected() {
        assert!(parse_cose_key(&[0xff, 0x00, 0x13]).is_err());
        let not_map = encode_value(&Value::Array(vec![])).unwrap();
        assert_eq!(parse_cose_key(&not_map), Err(AuthError::InvalidPublicKey));
    }

    #[test]
    fn test_sign1_requires_four_elements() {
        let three = encode_value(&Value::Array(vec![
            Value::Bytes(vec![]),
            Value::Map(vec![]),
            Value::Bytes(vec![1]),
        ]))
        .unwrap();
        assert_eq!(CoseSign1::from_bytes(&three), Err(AuthError::InvalidEnvelope));
    }

    #[test]
    fn test_sign1_tagged_and_untagged() {
        let mut envelope = CoseSign1::new(CoseSign1::protected_header(&[1, 2, 3]).unwrap(), b"hi".to_vec());
        envelope.signature = vec![9; 64];
        let untagged = envelope.to_bytes().unwrap();
        assert_eq!(CoseSign1::from_bytes(&untagged).unwrap(), envelope);

        let tagged = encode_value(&Value::Tag(18, Box::new(decode_value(&untagged).unwrap()))).unwrap();
        assert_eq!(CoseSign1::from_bytes(&tagged).unwrap(), envelope);
    }

    #[test]
    fn test_algorithm_check() {
        let envelope = CoseSign1::new(CoseSign1::protected_header(&[1]).unwrap(), vec![]);
        assert!(envelope.check_algorithm().is_ok());

        let es256 = encode_value(&Value::Map(vec![(int(1), int(-7))])).unwrap();
        let envelope = CoseSign1::new(es256, vec![]);
        assert_eq!(envelope.check_algorithm(), Err(AuthError::UnsupportedAlgorithm));
    }

    #[test]
    fn test_signed_bytes_prefix() {
        let envelope = CoseSign1::new(vec![0xa0], b"x".to_vec());
        let bytes = envelope.signed_bytes().unwrap();
        // array(4), text(10) "Signature1"
        assert_eq!(&bytes[..2], &[0x84, 0x6a]);
        assert_eq!(&bytes[2..12], b"Signature1");
    }
}
