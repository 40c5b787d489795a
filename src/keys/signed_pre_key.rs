use crate::keys::generate_random_seed;
use crate::{Error, IdentityKeyPair, X25519PublicKey, X25519Secret};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::Signature;
use std::time::{SystemTime, UNIX_EPOCH};

/// Id of the single signed pre-key this account keeps active.
pub const SIGNED_PRE_KEY_ID: u32 = 0;

/// A medium-term pre-key signed by the local identity key.
#[derive(Clone)]
pub struct SignedPreKeyRecord {
    id: u32,
    key: X25519Secret,
    signature: Signature,
    timestamp: u64,
}

impl SignedPreKeyRecord {
    /// Creates a new signed pre-key and signs its public bytes with `identity`.
    pub fn generate(id: u32, identity: &IdentityKeyPair) -> Result<Self, Error> {
        let key = X25519Secret::from(generate_random_seed()?);
        let signature = identity.sign(key.public_key().as_bytes());
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Ok(Self {
            id,
            key,
            signature,
            timestamp,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.key.public_key()
    }

    pub fn secret(&self) -> &X25519Secret {
        &self.key
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn signature_base64(&self) -> String {
        STANDARD.encode(self.signature.to_bytes())
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Serializes the record to a 108-byte array.
    ///
    /// The format is:
    /// - 4 bytes: ID (big-endian u32)
    /// - 32 bytes: X25519 private key
    /// - 64 bytes: Ed25519 signature over the public key
    /// - 8 bytes: creation timestamp (big-endian u64)
    pub fn to_bytes(&self) -> [u8; 108] {
        let mut result = [0u8; 108];
        result[0..4].copy_from_slice(&self.id.to_be_bytes());
        result[4..36].copy_from_slice(self.key.as_bytes());
        result[36..100].copy_from_slice(&self.signature.to_bytes());
        result[100..108].copy_from_slice(&self.timestamp.to_be_bytes());

        result
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 108 {
            return Err(Error::Serde(format!(
                "Invalid signed pre-key record length: {}",
                bytes.len()
            )));
        }

        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&bytes[0..4]);
        let mut key_bytes = Box::new([0u8; 32]);
        key_bytes.copy_from_slice(&bytes[4..36]);
        let mut signature_bytes = [0u8; 64];
        signature_bytes.copy_from_slice(&bytes[36..100]);
        let mut timestamp_bytes = [0u8; 8];
        timestamp_bytes.copy_from_slice(&bytes[100..108]);

        Ok(Self {
            id: u32::from_be_bytes(id_bytes),
            key: X25519Secret::from(key_bytes),
            signature: Signature::from_bytes(&signature_bytes),
            timestamp: u64::from_be_bytes(timestamp_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_covers_public_key() {
        let identity = IdentityKeyPair::generate().unwrap();
        let signed = SignedPreKeyRecord::generate(SIGNED_PRE_KEY_ID, &identity).unwrap();

        assert!(
            identity
                .public_key()
                .verify(signed.public_key().as_bytes(), signed.signature())
                .is_ok()
        );
    }

    #[test]
    fn test_signed_pre_key_serialization() {
        let identity = IdentityKeyPair::generate().unwrap();
        let original = SignedPreKeyRecord::generate(7, &identity).unwrap();
        let restored = SignedPreKeyRecord::from_bytes(&original.to_bytes()).unwrap();

        assert_eq!(restored.id(), 7);
        assert_eq!(restored.public_key(), original.public_key());
        assert_eq!(restored.signature(), original.signature());
        assert_eq!(restored.timestamp(), original.timestamp());
        assert!(SignedPreKeyRecord::from_bytes(&[0u8; 36]).is_err());
    }
}
