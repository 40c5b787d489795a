use crate::keys::generate_random_seed;
use crate::{Error, X25519PublicKey, X25519Secret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Reserved id of the last-resort pre-key.
pub const LAST_RESORT_PRE_KEY_ID: u32 = 0xFF_FFFF;

/// A one-time pre-key: an id and an X25519 key pair.
///
/// The record stored under [`LAST_RESORT_PRE_KEY_ID`] is the last-resort key,
/// which replenishment never replaces.
#[derive(Clone)]
pub struct PreKeyRecord {
    id: u32,
    key: X25519Secret,
}

impl PreKeyRecord {
    pub fn generate(id: u32) -> Result<Self, Error> {
        Ok(Self {
            id,
            key: X25519Secret::from(generate_random_seed()?),
        })
    }

    /// Generates one record per id.
    pub fn generate_batch(ids: &[u32]) -> Result<Vec<Self>, Error> {
        ids.iter().map(|id| Self::generate(*id)).collect()
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_last_resort(&self) -> bool {
        self.id == LAST_RESORT_PRE_KEY_ID
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.key.public_key()
    }

    pub fn secret(&self) -> &X25519Secret {
        &self.key
    }

    /// Serializes the record to a 36-byte array.
    ///
    /// The format is:
    /// - 4 bytes: ID (big-endian u32)
    /// - 32 bytes: X25519 private key
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut result = [0u8; 36];
        result[0..4].copy_from_slice(&self.id.to_be_bytes());
        result[4..].copy_from_slice(self.key.as_bytes());

        result
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 36 {
            return Err(Error::Serde(format!(
                "Invalid pre-key record length: {}",
                bytes.len()
            )));
        }

        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&bytes[0..4]);
        let mut key_bytes = Box::new([0u8; 32]);
        key_bytes.copy_from_slice(&bytes[4..]);

        Ok(Self {
            id: u32::from_be_bytes(id_bytes),
            key: X25519Secret::from(key_bytes),
        })
    }
}

impl Zeroize for PreKeyRecord {
    fn zeroize(&mut self) {
        self.key.zeroize();
        self.id = 0;
    }
}

impl ZeroizeOnDrop for PreKeyRecord {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_key_serialization() {
        let original = PreKeyRecord::generate(123).unwrap();
        let restored = PreKeyRecord::from_bytes(&original.to_bytes()).unwrap();

        assert_eq!(restored.id(), 123);
        assert_eq!(restored.public_key(), original.public_key());
        assert!(PreKeyRecord::from_bytes(&[0u8; 37]).is_err());
    }

    #[test]
    fn test_batch_generation() {
        let batch = PreKeyRecord::generate_batch(&[4, 5, 6]).unwrap();
        let ids: Vec<u32> = batch.iter().map(PreKeyRecord::id).collect();

        assert_eq!(ids, vec![4, 5, 6]);
        assert_ne!(batch[0].public_key(), batch[1].public_key());
        assert!(!batch[0].is_last_resort());
        assert!(PreKeyRecord::generate(LAST_RESORT_PRE_KEY_ID).unwrap().is_last_resort());
    }
}
