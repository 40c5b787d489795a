//! Storage capabilities consumed by a [`SessionCipher`](crate::SessionCipher).
//!
//! None of these methods fail: storage errors are logged by the implementation
//! and surface as empty reads.

use crate::{
    IdentityKey, IdentityKeyPair, PreKeyRecord, ProtocolAddress, SessionRecord,
    SignedPreKeyRecord,
};

pub trait IdentityKeyStore {
    fn identity_key_pair(&self) -> Option<IdentityKeyPair>;

    fn local_registration_id(&self) -> Option<u32>;

    /// Pins `identity` for `address` (trust on first use).
    ///
    /// Returns false when the identity is already recorded unchanged, without
    /// rewriting. A previously unknown identity is recorded and returns true.
    /// A differing identity is accepted silently: it replaces the pinned one
    /// and also returns true, so callers cannot tell a key change from a first
    /// sighting through this value.
    fn save_identity(&self, address: &ProtocolAddress, identity: &IdentityKey) -> bool;

    /// True when nothing is pinned for `address` or the pinned key matches.
    fn is_trusted_identity(&self, address: &ProtocolAddress, identity: &IdentityKey) -> bool;

    fn identity(&self, address: &ProtocolAddress) -> Option<IdentityKey>;
}

pub trait PreKeyStore {
    fn load_pre_key(&self, id: u32) -> Option<PreKeyRecord>;

    fn store_pre_key(&self, record: &PreKeyRecord);

    fn contains_pre_key(&self, id: u32) -> bool;

    fn remove_pre_key(&self, id: u32);
}

pub trait SignedPreKeyStore {
    fn load_signed_pre_key(&self, id: u32) -> Option<SignedPreKeyRecord>;

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord);

    fn contains_signed_pre_key(&self, id: u32) -> bool;

    fn remove_signed_pre_key(&self, id: u32);
}

pub trait SessionStore {
    /// Returns the stored record, or a fresh placeholder when there is none.
    fn load_session(&self, address: &ProtocolAddress) -> SessionRecord;

    fn store_session(&self, address: &ProtocolAddress, record: &SessionRecord);

    /// True only for a stored record that is not fresh.
    fn contains_session(&self, address: &ProtocolAddress) -> bool;

    fn delete_session(&self, address: &ProtocolAddress);

    /// Deletes the sessions of every device of `name`.
    fn delete_all_sessions(&self, name: &str);
}

/// The full storage capability set a session cipher operates on.
pub trait ProtocolStoreCapability:
    IdentityKeyStore + PreKeyStore + SignedPreKeyStore + SessionStore
{
}

impl<T> ProtocolStoreCapability for T where
    T: IdentityKeyStore + PreKeyStore + SignedPreKeyStore + SessionStore
{
}
