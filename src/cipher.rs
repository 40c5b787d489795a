use crate::{IdentityKey, ProtocolAddress, ProtocolStoreCapability, X25519PublicKey};
use ed25519_dalek::Signature;

/// Failures reported by a [`SessionCipher`].
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum CipherError {
    /// The message was already decrypted once.
    #[error("Duplicate message")]
    DuplicateMessage,

    /// The sender's identity differs from the one pinned for the address.
    #[error("Untrusted identity for {0}")]
    UntrustedIdentity(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("No session for recipient")]
    NoSession,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The message references a pre-key id that is not stored.
    #[error("Invalid pre-key id: {0}")]
    InvalidKeyId(u32),

    #[error("Cipher failure: {0}")]
    Other(String),
}

/// Wire form of an encrypted message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CiphertextKind {
    /// Ordinary ratchet message on an established session.
    Signal,
    /// First message of a session, carrying the sender's key-agreement material.
    PreKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CiphertextMessage {
    pub kind: CiphertextKind,
    pub body: Vec<u8>,
}

/// A contact's published keys, as fetched from the relay.
#[derive(Clone, Debug)]
pub struct PreKeyBundle {
    pub registration_id: u32,
    pub device_id: u32,
    /// One-time pre-key, absent when the contact ran out.
    pub pre_key: Option<(u32, X25519PublicKey)>,
    pub signed_pre_key_id: u32,
    pub signed_pre_key: X25519PublicKey,
    pub signed_pre_key_signature: Signature,
    pub identity_key: IdentityKey,
}

impl PreKeyBundle {
    /// Checks that the signed pre-key was signed by the bundle's identity.
    pub fn verify(&self) -> Result<(), CipherError> {
        self.identity_key
            .verify(self.signed_pre_key.as_bytes(), &self.signed_pre_key_signature)
            .map_err(|err| CipherError::InvalidKey(err.to_string()))
    }
}

/// The ratchet and key-agreement implementation this crate drives.
///
/// Implementations keep all of their state in the supplied store: sessions,
/// pinned identities and the local pre-keys they consume.
pub trait SessionCipher: Send + Sync {
    /// Builds a session for `address` from a fetched bundle.
    fn process_pre_key_bundle(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
        bundle: &PreKeyBundle,
    ) -> Result<(), CipherError>;

    fn encrypt(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, CipherError>;

    fn decrypt_signal_message(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CipherError>;

    fn decrypt_pre_key_message(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CipherError>;

    /// Registration id of the remote party of the session with `address`.
    fn remote_registration_id(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
    ) -> Result<u32, CipherError>;
}
