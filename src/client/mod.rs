mod bootstrap;
mod receive;
mod registration;
mod send;

pub use receive::{Inbox, UnreadCount};

use crate::{ClientConfig, Error, MessageArchive, ProtocolStore, ServerGateway, SessionCipher};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{Span, debug_span};

/// Where the local account stands in its registration lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountState {
    /// No identity key pair or registration id is stored.
    Unregistered,
    /// Registered with the relay; pre-key supply not yet confirmed.
    Registered,
    /// Uploading a new pre-key batch after the relay ran low.
    Replenishing,
    /// Registered with enough pre-keys published.
    Ready,
}

/// Drives registration, pre-key upkeep and message exchange for one account.
///
/// Owns the protocol store, the message archive and the relay gateway, and
/// hands the store to the session cipher for every cryptographic step.
/// Operations take `&mut self`; callers serialize them.
pub struct SignalClient<C> {
    config: ClientConfig,
    store: ProtocolStore,
    archive: MessageArchive,
    gateway: ServerGateway,
    cipher: Arc<C>,
    state: AccountState,
    span: Span,
}

impl<C: SessionCipher> SignalClient<C> {
    pub fn new(config: ClientConfig, cipher: Arc<C>, span: Span) -> Result<Self, Error> {
        config.validate()?;

        let store = ProtocolStore::open(
            &config.data_dir,
            debug_span!(parent: &span, "protocol_store"),
        );
        let archive = MessageArchive::open(
            &config.data_dir,
            debug_span!(parent: &span, "message_archive"),
        );
        let gateway = ServerGateway::new(
            &config.host,
            &config.access_token,
            config.request_timeout(),
            debug_span!(parent: &span, "server_gateway"),
        )?;
        let state = if store.is_local_registered() {
            AccountState::Registered
        } else {
            AccountState::Unregistered
        };

        Ok(Self {
            config,
            store,
            archive,
            gateway,
            cipher,
            state,
            span,
        })
    }

    pub fn state(&self) -> AccountState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &ProtocolStore {
        &self.store
    }

    pub fn archive(&self) -> &MessageArchive {
        &self.archive
    }

    pub fn gateway(&self) -> &ServerGateway {
        &self.gateway
    }

    /// Wipes protocol state and the archive; the account must register again.
    pub fn reset(&mut self) {
        self.store.delete_all();
        self.archive.delete_all();
        self.state = AccountState::Unregistered;
    }
}

/// Parses a relay response, reporting a shape mismatch as a server failure.
pub(crate) fn parse_response<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, Error> {
    serde_json::from_value(value)
        .map_err(|err| Error::server(format!("Malformed {what} response: {err}")))
}
