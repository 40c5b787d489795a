mod proto;
mod table;
mod traits;

pub(crate) use table::write_atomically;
pub use traits::*;

use crate::{
    IdentityKey, IdentityKeyPair, LAST_RESORT_PRE_KEY_ID, PreKeyRecord, ProtocolAddress,
    SessionRecord, SignedPreKeyRecord,
};
use proto::{
    IdentityTableProto, LocalIdentityProto, PreKeyTableProto, SessionProto, SessionTableProto,
    SignedPreKeyTableProto, TableProto,
};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use table::{Change, Table};
use tracing::{Span, debug, warn};

/// Directory under the data root holding the protocol tables.
pub const PROTOCOL_NAMESPACE: &str = "signal";

/// Durable protocol state of the local account.
///
/// Each logical table lives in its own file under `<data_dir>/signal/`:
/// `user.pb` (identity key pair, registration id, username, signaling key,
/// reset version), `prekeys.pb`, `signed_prekeys.pb`, `sessions.pb` and
/// `identities.pb`. Storage failures are logged on the store's span and read
/// back as empty values.
pub struct ProtocolStore {
    root: PathBuf,
    local: Table<LocalIdentityProto>,
    pre_keys: Table<PreKeyTableProto>,
    signed_pre_keys: Table<SignedPreKeyTableProto>,
    sessions: Table<SessionTableProto>,
    identities: Table<IdentityTableProto>,
    span: Span,
}

impl ProtocolStore {
    pub fn open(data_dir: &Path, span: Span) -> Self {
        let root = data_dir.join(PROTOCOL_NAMESPACE);

        Self {
            local: open_table(&root, "user.pb", &span),
            pre_keys: open_table(&root, "prekeys.pb", &span),
            signed_pre_keys: open_table(&root, "signed_prekeys.pb", &span),
            sessions: open_table(&root, "sessions.pb", &span),
            identities: open_table(&root, "identities.pb", &span),
            root,
            span,
        }
    }

    /// Stores the identity key pair unless one is already present.
    pub fn set_identity_key_pair(&self, key_pair: &IdentityKeyPair) -> bool {
        self.set_local_once("identity key pair", |local| {
            set_once(&mut local.identity_key_pair, key_pair.to_bytes().to_vec())
        })
    }

    pub fn set_local_registration_id(&self, registration_id: u32) -> bool {
        self.set_local_once("registration id", |local| {
            set_once(&mut local.registration_id, registration_id)
        })
    }

    pub fn local_username(&self) -> Option<String> {
        self.local.load().username
    }

    pub fn set_local_username(&self, username: &str) -> bool {
        self.set_local_once("username", |local| {
            set_once(&mut local.username, username.to_string())
        })
    }

    /// Base64 signaling key shared with the relay for legacy push payloads.
    pub fn signaling_key(&self) -> Option<String> {
        self.local.load().signaling_key.filter(|key| !key.is_empty())
    }

    pub fn set_signaling_key(&self, signaling_key: &str) -> bool {
        self.set_local_once("signaling key", |local| {
            if local.signaling_key.as_deref().is_some_and(|key| !key.is_empty()) {
                return false;
            }
            local.signaling_key = Some(signaling_key.to_string());
            true
        })
    }

    pub fn reset_version(&self) -> Option<u32> {
        self.local.load().reset_version
    }

    pub fn set_reset_version(&self, reset_version: u32) -> bool {
        self.set_local_once("reset version", |local| {
            set_once(&mut local.reset_version, reset_version)
        })
    }

    /// True when both an identity key pair and a registration id are stored.
    pub fn is_local_registered(&self) -> bool {
        let local = self.local.load();
        local.identity_key_pair.is_some() && local.registration_id.is_some()
    }

    /// Number of stored one-time pre-keys, not counting the last-resort key.
    pub fn last_pre_key_index(&self) -> u32 {
        let count = self
            .pre_keys
            .load()
            .keys
            .keys()
            .filter(|id| **id != LAST_RESORT_PRE_KEY_ID)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn stored_pre_key_ids(&self) -> HashSet<u32> {
        self.pre_keys.load().keys.into_keys().collect()
    }

    /// Stores a batch of pre-keys with a single table write.
    pub fn store_pre_keys(&self, records: &[PreKeyRecord]) {
        if records.is_empty() {
            return;
        }
        self.pre_keys.update(|table| {
            for record in records {
                table.keys.insert(record.id(), record.to_bytes().to_vec());
            }
            Change::Write(())
        });
    }

    /// Drops the pinned identity for `address` so the next one is trusted.
    pub fn remove_identity(&self, address: &ProtocolAddress) {
        self.identities.update(|table| {
            match table.identities.remove(&address.storage_key()) {
                Some(_) => Change::Write(()),
                None => Change::Keep(()),
            }
        });
    }

    /// Wipes every protocol table and the namespace directory.
    pub fn delete_all(&self) {
        self.local.clear();
        self.pre_keys.clear();
        self.signed_pre_keys.clear();
        self.sessions.clear();
        self.identities.clear();

        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(parent: &self.span, "Protocol store wiped"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                parent: &self.span,
                error = %err,
                "Failed to remove protocol namespace"
            ),
        }
    }

    fn set_local_once(&self, field: &str, f: impl FnOnce(&mut LocalIdentityProto) -> bool) -> bool {
        let stored = self.local.update(|local| {
            if f(local) {
                Change::Write(true)
            } else {
                Change::Keep(false)
            }
        });
        if !stored {
            debug!(parent: &self.span, field, "Local value already present, keeping it");
        }
        stored
    }
}

fn open_table<T: TableProto>(root: &Path, name: &str, span: &Span) -> Table<T> {
    Table::new(root.join(name), span.clone())
}

/// True when `key` is the storage key of some device of `name`.
fn is_device_of(key: &str, name: &str) -> bool {
    key.rsplit_once('.')
        .is_some_and(|(stored, device)| stored == name && device.parse::<u32>().is_ok())
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}

impl IdentityKeyStore for ProtocolStore {
    fn identity_key_pair(&self) -> Option<IdentityKeyPair> {
        let bytes = self.local.load().identity_key_pair?;
        match <[u8; 64]>::try_from(bytes.as_slice()) {
            Ok(bytes) => Some(IdentityKeyPair::from(bytes)),
            Err(_) => {
                warn!(
                    parent: &self.span,
                    len = bytes.len(),
                    "Stored identity key pair has an invalid length"
                );
                None
            }
        }
    }

    fn local_registration_id(&self) -> Option<u32> {
        self.local.load().registration_id
    }

    fn save_identity(&self, address: &ProtocolAddress, identity: &IdentityKey) -> bool {
        let encoded = identity.to_bytes().to_vec();
        let key = address.storage_key();

        self.identities.update(|table| {
            let replacing = match table.identities.get(&key) {
                Some(stored) if *stored == encoded => return Change::Keep(false),
                Some(_) => true,
                None => false,
            };
            if replacing {
                debug!(parent: &self.span, %address, "Replacing pinned identity key");
            }
            table.identities.insert(key, encoded);
            Change::Write(true)
        })
    }

    fn is_trusted_identity(&self, address: &ProtocolAddress, identity: &IdentityKey) -> bool {
        match self.identity(address) {
            Some(pinned) => pinned == *identity,
            None => true,
        }
    }

    fn identity(&self, address: &ProtocolAddress) -> Option<IdentityKey> {
        let table = self.identities.load();
        let bytes = table.identities.get(&address.storage_key())?;
        match IdentityKey::from_bytes(bytes) {
            Ok(identity) => Some(identity),
            Err(err) => {
                warn!(parent: &self.span, %address, error = %err, "Stored identity is unreadable");
                None
            }
        }
    }
}

impl PreKeyStore for ProtocolStore {
    fn load_pre_key(&self, id: u32) -> Option<PreKeyRecord> {
        let table = self.pre_keys.load();
        let bytes = table.keys.get(&id)?;
        match PreKeyRecord::from_bytes(bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(parent: &self.span, id, error = %err, "Stored pre-key is unreadable");
                None
            }
        }
    }

    fn store_pre_key(&self, record: &PreKeyRecord) {
        self.store_pre_keys(std::slice::from_ref(record));
    }

    fn contains_pre_key(&self, id: u32) -> bool {
        self.pre_keys.load().keys.contains_key(&id)
    }

    fn remove_pre_key(&self, id: u32) {
        self.pre_keys.update(|table| match table.keys.remove(&id) {
            Some(_) => Change::Write(()),
            None => Change::Keep(()),
        });
    }
}

impl SignedPreKeyStore for ProtocolStore {
    fn load_signed_pre_key(&self, id: u32) -> Option<SignedPreKeyRecord> {
        let table = self.signed_pre_keys.load();
        let bytes = table.keys.get(&id)?;
        match SignedPreKeyRecord::from_bytes(bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(parent: &self.span, id, error = %err, "Stored signed pre-key is unreadable");
                None
            }
        }
    }

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) {
        self.signed_pre_keys.update(|table| {
            table.keys.insert(record.id(), record.to_bytes().to_vec());
            Change::Write(())
        });
    }

    fn contains_signed_pre_key(&self, id: u32) -> bool {
        self.signed_pre_keys.load().keys.contains_key(&id)
    }

    fn remove_signed_pre_key(&self, id: u32) {
        self.signed_pre_keys.update(|table| match table.keys.remove(&id) {
            Some(_) => Change::Write(()),
            None => Change::Keep(()),
        });
    }
}

impl SessionStore for ProtocolStore {
    fn load_session(&self, address: &ProtocolAddress) -> SessionRecord {
        match self.sessions.load().sessions.remove(&address.storage_key()) {
            Some(session) => SessionRecord::from_parts(session.state, session.fresh),
            None => SessionRecord::fresh(),
        }
    }

    fn store_session(&self, address: &ProtocolAddress, record: &SessionRecord) {
        let session = SessionProto {
            state: record.state().to_vec(),
            fresh: record.is_fresh(),
        };
        self.sessions.update(|table| {
            table.sessions.insert(address.storage_key(), session);
            Change::Write(())
        });
    }

    fn contains_session(&self, address: &ProtocolAddress) -> bool {
        self.sessions
            .load()
            .sessions
            .get(&address.storage_key())
            .is_some_and(|session| !session.fresh)
    }

    fn delete_session(&self, address: &ProtocolAddress) {
        self.sessions.update(|table| {
            match table.sessions.remove(&address.storage_key()) {
                Some(_) => Change::Write(()),
                None => Change::Keep(()),
            }
        });
    }

    fn delete_all_sessions(&self, name: &str) {
        self.sessions.update(|table| {
            let before = table.sessions.len();
            table.sessions.retain(|key, _| !is_device_of(key, name));
            if table.sessions.len() == before {
                Change::Keep(())
            } else {
                Change::Write(())
            }
        });
    }
}
