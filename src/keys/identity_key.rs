use crate::keys::generate_random_seed;
use crate::{Error, X25519PublicKey, X25519Secret};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{SecretKey, Signature, Signer, SigningKey, VerifyingKey};
use zeroize::Zeroize;

/// Long-term identity key pair of the local account.
///
/// Holds an Ed25519 signing key for authenticating pre-keys and an X25519
/// key for agreement, both derived from the same seed.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing_key: Box<SigningKey>,
    dh_key: X25519Secret,
}

impl IdentityKeyPair {
    /// Creates a new identity key pair from a fresh random seed.
    pub fn generate() -> Result<Self, Error> {
        let seed = generate_random_seed()?;
        let signing_key = Box::new(SigningKey::from_bytes(&SecretKey::from(*seed)));
        let dh_key = X25519Secret::from(seed);

        Ok(Self {
            signing_key,
            dh_key,
        })
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Returns the public identity that peers pin.
    pub fn public_key(&self) -> IdentityKey {
        IdentityKey {
            dh_key: self.dh_key.public_key(),
            signing_key: self.signing_key.verifying_key(),
        }
    }

    /// Agreement secret handed to the session cipher for key agreement.
    pub fn dh_secret(&self) -> &X25519Secret {
        &self.dh_key
    }

    /// Serializes the key pair to a 64-byte array.
    ///
    /// The first 32 bytes contain the Ed25519 private key,
    /// and the last 32 bytes contain the X25519 private key.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(self.signing_key.as_bytes().as_slice());
        bytes[32..64].copy_from_slice(self.dh_key.as_bytes());

        bytes
    }
}

impl From<[u8; 64]> for IdentityKeyPair {
    fn from(mut bytes: [u8; 64]) -> Self {
        let mut signing_bytes = Box::new([0u8; 32]);
        signing_bytes.copy_from_slice(&bytes[0..32]);
        let signing_key = Box::new(SigningKey::from_bytes(&signing_bytes));
        signing_bytes.zeroize();

        let mut dh_bytes = Box::new([0u8; 32]);
        dh_bytes.copy_from_slice(&bytes[32..64]);
        let dh_key = X25519Secret::from(dh_bytes);

        bytes.zeroize();

        Self {
            signing_key,
            dh_key,
        }
    }
}

/// Public identity of an account: X25519 agreement key plus Ed25519 verifying key.
///
/// Encoded as 64 bytes, agreement key first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityKey {
    dh_key: X25519PublicKey,
    signing_key: VerifyingKey,
}

impl IdentityKey {
    pub fn dh_key(&self) -> &X25519PublicKey {
        &self.dh_key
    }

    /// Verifies an Ed25519 signature made by the owner of this identity.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), Error> {
        self.signing_key
            .verify_strict(message, signature)
            .map_err(|err| Error::Native(format!("Signature verification failed: {err}")))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(self.dh_key.as_bytes());
        bytes[32..64].copy_from_slice(self.signing_key.as_bytes());

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 64 {
            return Err(Error::Serde(format!(
                "Invalid identity key length: {}",
                bytes.len()
            )));
        }

        let mut dh_bytes = [0u8; 32];
        dh_bytes.copy_from_slice(&bytes[0..32]);
        let mut signing_bytes = [0u8; 32];
        signing_bytes.copy_from_slice(&bytes[32..64]);

        let signing_key = VerifyingKey::from_bytes(&signing_bytes)
            .map_err(|err| Error::Serde(format!("Invalid identity signing key: {err}")))?;

        Ok(Self {
            dh_key: X25519PublicKey::from(dh_bytes),
            signing_key,
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|err| Error::Serde(format!("Invalid identity key encoding: {err}")))?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_and_verification() {
        let identity = IdentityKeyPair::generate().unwrap();
        let message = b"signed pre-key public bytes";

        let signature = identity.sign(message);
        assert!(identity.public_key().verify(message, &signature).is_ok());
        assert!(identity.public_key().verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn test_key_pair_restores_same_public_key() {
        let original = IdentityKeyPair::generate().unwrap();
        let restored = IdentityKeyPair::from(original.to_bytes());

        assert_eq!(original.public_key(), restored.public_key());
        assert_eq!(original.to_bytes(), restored.to_bytes());
    }

    #[test]
    fn test_public_identity_encoding() {
        let public = IdentityKeyPair::generate().unwrap().public_key();

        assert_eq!(IdentityKey::from_bytes(&public.to_bytes()).unwrap(), public);
        assert_eq!(IdentityKey::from_base64(&public.to_base64()).unwrap(), public);
        assert!(IdentityKey::from_bytes(&[0u8; 33]).is_err());
    }
}
