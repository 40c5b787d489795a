use crate::{
    AccountState, ClientConfig, Contact, Error, Inbox, LegacyCipher, Message, SessionCipher,
    SessionStore, SignalClient, Thread, UnreadCount,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Span, info};

/// How [`Messenger::add_contact`] treats an existing session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bootstrap {
    /// Always fetch a new bundle and start a fresh session.
    Forced,
    /// Keep an established session; bootstrap only when there is none.
    Lazy,
}

/// Entry point for a hosting application.
///
/// Every operation runs on one serialized lane: the next operation starts only
/// after the previous one, including its network round trips, has finished.
pub struct Messenger<C> {
    cipher: Arc<C>,
    lane: Mutex<Option<SignalClient<C>>>,
    span: Span,
}

impl<C: SessionCipher> Messenger<C> {
    pub fn new(cipher: C, span: Span) -> Self {
        Self {
            cipher: Arc::new(cipher),
            lane: Mutex::new(None),
            span,
        }
    }

    /// Validates `config`, opens local state and resumes or registers the account.
    ///
    /// The client stays installed even when the registration round trip fails,
    /// so the application can retry with [`Messenger::register_account`].
    pub async fn initialize(&self, config: ClientConfig) -> Result<AccountState, Error> {
        config.validate()?;
        let mut lane = self.lane.lock().await;
        let client = SignalClient::new(config, Arc::clone(&self.cipher), self.span.clone())?;
        info!(parent: &self.span, username = %client.config().username, "Messenger initialized");

        lane.insert(client).initialize().await
    }

    pub async fn register_account(&self) -> Result<AccountState, Error> {
        let mut lane = self.lane.lock().await;
        installed_mut(lane.as_mut())?.register_account().await
    }

    /// Wipes protocol state and stored messages.
    pub async fn reset_account(&self) -> Result<(), Error> {
        let mut lane = self.lane.lock().await;
        installed_mut(lane.as_mut())?.reset();
        Ok(())
    }

    pub async fn add_contact(&self, contact: &Contact, bootstrap: Bootstrap) -> Result<(), Error> {
        let lane = self.lane.lock().await;
        let client = installed(lane.as_ref())?;
        if bootstrap == Bootstrap::Lazy && client.store().contains_session(&contact.address()) {
            return Ok(());
        }
        client.request_pre_keys(contact).await
    }

    /// Drops the session with `contact` and its stored messages.
    pub async fn delete_contact(&self, contact: &str) -> Result<(), Error> {
        let lane = self.lane.lock().await;
        let client = installed(lane.as_ref())?;
        client.store().delete_session(&Contact::new(contact).address());
        client.archive().delete_contact(contact);
        Ok(())
    }

    /// Deletes stored messages with `contact` under `tag`, or under every tag for `"*"`,
    /// and purges matching envelopes still queued on the relay.
    pub async fn delete_messages(&self, contact: &str, tag: &str) -> Result<(), Error> {
        let lane = self.lane.lock().await;
        let client = installed(lane.as_ref())?;
        if tag == "*" {
            client.archive().delete_contact(contact);
        } else {
            client.archive().delete_contact_tag(contact, tag);
        }
        client.delete_contact_pending_messages(contact, tag).await?;
        Ok(())
    }

    pub async fn send_message(
        &self,
        contact: &Contact,
        text: &str,
        tag: &str,
        silent: bool,
    ) -> Result<(), Error> {
        let lane = self.lane.lock().await;
        installed(lane.as_ref())?.send_message(contact, text, tag, silent).await
    }

    pub async fn receive_new_messages(&self, contact: &str, tag: &str) -> Result<Inbox, Error> {
        let lane = self.lane.lock().await;
        installed(lane.as_ref())?.receive_messages(contact, tag).await
    }

    /// Stored messages with `contact` under `tag`, newest first.
    pub async fn stored_messages(&self, contact: &str, tag: &str) -> Result<Vec<Message>, Error> {
        let lane = self.lane.lock().await;
        let mut messages = installed(lane.as_ref())?.archive().messages(contact, tag);
        messages.sort_by(|a, b| b.saved_timestamp.cmp(&a.saved_timestamp));
        Ok(messages)
    }

    pub async fn unread_summary(&self, tag: &str) -> Result<BTreeMap<String, UnreadCount>, Error> {
        let lane = self.lane.lock().await;
        installed(lane.as_ref())?.unread_summary(tag).await
    }

    pub async fn threads(&self, tag: &str) -> Result<Vec<Thread>, Error> {
        let lane = self.lane.lock().await;
        Ok(installed(lane.as_ref())?.archive().threads(tag))
    }

    pub async fn set_push_token(&self, token: &str) -> Result<(), Error> {
        let lane = self.lane.lock().await;
        installed(lane.as_ref())?.save_push_token(token).await
    }

    /// Decrypts a legacy push body with the stored signaling key.
    pub async fn decode_legacy_body(&self, body: &str) -> Result<Vec<u8>, Error> {
        let lane = self.lane.lock().await;
        let signaling_key = installed(lane.as_ref())?
            .store()
            .signaling_key()
            .ok_or_else(|| Error::Native("No signaling key stored".to_string()))?;
        LegacyCipher::new(&signaling_key)?.decrypt_body(body)
    }

    pub async fn decrypt_pushed_message(
        &self,
        tag: &str,
        envelope_json: &str,
    ) -> Result<Option<Message>, Error> {
        let lane = self.lane.lock().await;
        installed(lane.as_ref())?.decrypt_pushed_message(tag, envelope_json).await
    }

    pub async fn delete_relay_message(&self, contact: &str, timestamp: u64) -> Result<(), Error> {
        let lane = self.lane.lock().await;
        installed(lane.as_ref())?.delete_relay_message(contact, timestamp).await
    }

    /// Current lifecycle state, or `None` before initialization.
    pub async fn state(&self) -> Option<AccountState> {
        self.lane.lock().await.as_ref().map(SignalClient::state)
    }
}

fn installed<C>(client: Option<&SignalClient<C>>) -> Result<&SignalClient<C>, Error> {
    client.ok_or_else(|| Error::Config("Messenger is not initialized".to_string()))
}

fn installed_mut<C>(
    client: Option<&mut SignalClient<C>>,
) -> Result<&mut SignalClient<C>, Error> {
    client.ok_or_else(|| Error::Config("Messenger is not initialized".to_string()))
}
