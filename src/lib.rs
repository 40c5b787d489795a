//! Persistent end-to-end protocol state for one messaging account, and the
//! flows that keep it in sync with a relay: registration, pre-key upkeep,
//! contact bootstrap, send with stale-device retry and receive with decrypt
//! fallback. The ratchet itself is supplied through [`SessionCipher`].

mod types;
pub use types::*;

mod keys;
pub use keys::*;

mod address;
pub use address::*;

mod session;
pub use session::SessionRecord;

mod error;
pub use error::{Error, ErrorCode};

mod config;
pub use config::ClientConfig;

mod cipher;
pub use cipher::*;

mod store;
pub use store::{
    IdentityKeyStore, PROTOCOL_NAMESPACE, PreKeyStore, ProtocolStore, ProtocolStoreCapability,
    SessionStore, SignedPreKeyStore,
};

mod archive;
pub use archive::{
    ARCHIVE_NAMESPACE, CHAT_TAG, Message, MessageArchive, MessageKind, Thread,
    UNDECRYPTABLE_CONTENT, UNDECRYPTABLE_STATUS,
};

mod legacy;
pub use legacy::LegacyCipher;

mod gateway;
pub use gateway::{CIPHERTEXT_TYPE, Envelope, ServerGateway, TIMESTAMP_HEADER, is_valid_status};

mod client;
pub use client::{AccountState, Inbox, SignalClient, UnreadCount};

mod messenger;
pub use messenger::{Bootstrap, Messenger};
