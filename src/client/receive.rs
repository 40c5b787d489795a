use super::{SignalClient, parse_response};
use crate::gateway::{CIPHERTEXT_TYPE, Envelope, IncomingMessageList, MESSAGES_PATH};
use crate::{
    CipherError, DEFAULT_DEVICE_ID, Error, Message, ProtocolAddress, SessionCipher, SessionStore,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Pending ciphertexts from one sender.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UnreadCount {
    pub count: u32,
    /// Newest relay timestamp among them.
    pub latest: u64,
}

/// Result of draining the relay for one contact and tag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Inbox {
    /// Per-sender accounting over every envelope with the tag, not only the contact's.
    pub unread: BTreeMap<String, UnreadCount>,
    /// Messages archived by this drain, in relay order.
    pub messages: Vec<Message>,
}

enum Decrypted {
    Plaintext(Vec<u8>),
    Duplicate,
    Failed(CipherError),
}

impl<C: SessionCipher> SignalClient<C> {
    /// Drains pending envelopes from `contact` under `tag`.
    ///
    /// Every envelope from the contact is acknowledged provided a session with
    /// the contact exists. It is archived unless it has no body or is a
    /// duplicate, as a placeholder when it cannot be decrypted. One bad
    /// envelope never fails the drain.
    pub async fn receive_messages(&self, contact: &str, tag: &str) -> Result<Inbox, Error> {
        let envelopes = self.fetch_envelopes().await?;
        let address = ProtocolAddress::new(contact, DEFAULT_DEVICE_ID);
        let mut inbox = Inbox::default();

        for envelope in envelopes.iter().filter(|envelope| envelope.tag == tag) {
            count_unread(&mut inbox.unread, envelope);

            if envelope.source != contact || !self.store.contains_session(&address) {
                continue;
            }

            if envelope.message.is_empty() {
                debug!(parent: &self.span, %address, timestamp = envelope.timestamp, "Acknowledging envelope without body");
            } else if let Some(message) = self.open_envelope(&address, envelope, tag) {
                self.archive.append(contact, tag, message.clone());
                inbox.messages.push(message);
            }
            self.acknowledge(&envelope.source, envelope.timestamp).await;
        }

        Ok(inbox)
    }

    /// Counts pending ciphertexts per sender under `tag` without consuming them.
    pub async fn unread_summary(&self, tag: &str) -> Result<BTreeMap<String, UnreadCount>, Error> {
        let envelopes = self.fetch_envelopes().await?;
        let mut unread = BTreeMap::new();
        for envelope in envelopes.iter().filter(|envelope| envelope.tag == tag) {
            count_unread(&mut unread, envelope);
        }

        Ok(unread)
    }

    /// Decrypts and archives one envelope delivered outside the relay queue.
    ///
    /// Returns `None` when there is no session with the sender, the envelope
    /// has no body, or it was already decrypted.
    pub async fn decrypt_pushed_message(
        &self,
        tag: &str,
        envelope_json: &str,
    ) -> Result<Option<Message>, Error> {
        let envelope: Envelope = serde_json::from_str(envelope_json)
            .map_err(|err| Error::Native(format!("Malformed pushed envelope: {err}")))?;
        let address = ProtocolAddress::new(envelope.source.clone(), DEFAULT_DEVICE_ID);
        if envelope.message.is_empty() || !self.store.contains_session(&address) {
            return Ok(None);
        }
        let body = STANDARD
            .decode(&envelope.message)
            .map_err(|err| Error::Native(format!("Malformed pushed envelope body: {err}")))?;

        let message = match self.decrypt_with_fallback(&address, &body) {
            Decrypted::Duplicate => return Ok(None),
            Decrypted::Failed(err) => return Err(err.into()),
            Decrypted::Plaintext(plaintext) => to_message(&envelope, tag, plaintext),
        };
        self.archive.append(&envelope.source, tag, message.clone());

        Ok(Some(message))
    }

    /// Removes pending envelopes from `contact` under `tag`, or under any tag for `"*"`.
    ///
    /// Returns how many envelopes were targeted; individual deletes are best effort.
    pub async fn delete_contact_pending_messages(&self, contact: &str, tag: &str) -> Result<usize, Error> {
        let envelopes = self.fetch_envelopes().await?;
        let mut targeted = 0;
        for envelope in envelopes
            .iter()
            .filter(|envelope| envelope.source == contact && (tag == "*" || envelope.tag == tag))
        {
            self.acknowledge(&envelope.source, envelope.timestamp).await;
            targeted += 1;
        }

        Ok(targeted)
    }

    /// Acknowledges a single envelope.
    pub async fn delete_relay_message(&self, contact: &str, timestamp: u64) -> Result<(), Error> {
        let path = format!("{MESSAGES_PATH}/{contact}/{timestamp}");
        self.gateway
            .call(&path, Method::DELETE, None, false)
            .await?;
        Ok(())
    }

    async fn fetch_envelopes(&self) -> Result<Vec<Envelope>, Error> {
        let response = self
            .gateway
            .call(MESSAGES_PATH, Method::GET, None, false)
            .await?;
        let list: IncomingMessageList = parse_response(response, "message list")?;

        Ok(list
            .messages
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Envelope>(value) {
                Ok(envelope) => Some(envelope),
                Err(err) => {
                    warn!(parent: &self.span, error = %err, "Skipping unparseable envelope");
                    None
                }
            })
            .collect())
    }

    async fn acknowledge(&self, source: &str, timestamp: u64) {
        if let Err(err) = self.delete_relay_message(source, timestamp).await {
            warn!(parent: &self.span, source, timestamp, error = %err, "Failed to acknowledge envelope");
        }
    }

    fn open_envelope(&self, address: &ProtocolAddress, envelope: &Envelope, tag: &str) -> Option<Message> {
        let body = match STANDARD.decode(&envelope.message) {
            Ok(body) => body,
            Err(err) => {
                warn!(parent: &self.span, %address, timestamp = envelope.timestamp, error = %err, "Envelope body is not base64");
                return Some(Message::undecryptable(&envelope.source, envelope.timestamp, tag));
            }
        };

        match self.decrypt_with_fallback(address, &body) {
            Decrypted::Plaintext(plaintext) => Some(to_message(envelope, tag, plaintext)),
            Decrypted::Duplicate => {
                debug!(parent: &self.span, %address, timestamp = envelope.timestamp, "Skipping duplicate envelope");
                None
            }
            Decrypted::Failed(err) => {
                warn!(parent: &self.span, %address, timestamp = envelope.timestamp, error = %err, "Envelope could not be decrypted");
                Some(Message::undecryptable(&envelope.source, envelope.timestamp, tag))
            }
        }
    }

    /// Ordinary message first, then pre-key message; an untrusted identity
    /// is dropped and the pre-key path retried once.
    fn decrypt_with_fallback(&self, address: &ProtocolAddress, body: &[u8]) -> Decrypted {
        match self.cipher.decrypt_signal_message(&self.store, address, body) {
            Ok(plaintext) => return Decrypted::Plaintext(plaintext),
            Err(CipherError::DuplicateMessage) => return Decrypted::Duplicate,
            Err(err) => {
                debug!(parent: &self.span, %address, error = %err, "Not an ordinary message, trying pre-key message");
            }
        }

        match self.cipher.decrypt_pre_key_message(&self.store, address, body) {
            Ok(plaintext) => Decrypted::Plaintext(plaintext),
            Err(CipherError::DuplicateMessage) => Decrypted::Duplicate,
            Err(CipherError::UntrustedIdentity(_)) => {
                debug!(parent: &self.span, %address, "Re-trusting sender identity");
                self.store.remove_identity(address);
                match self.cipher.decrypt_pre_key_message(&self.store, address, body) {
                    Ok(plaintext) => Decrypted::Plaintext(plaintext),
                    Err(CipherError::DuplicateMessage) => Decrypted::Duplicate,
                    Err(err) => Decrypted::Failed(err),
                }
            }
            Err(err) => Decrypted::Failed(err),
        }
    }
}

fn count_unread(unread: &mut BTreeMap<String, UnreadCount>, envelope: &Envelope) {
    if envelope.kind != CIPHERTEXT_TYPE {
        return;
    }
    let entry = unread.entry(envelope.source.clone()).or_default();
    entry.count += 1;
    entry.latest = entry.latest.max(envelope.timestamp);
}

fn to_message(envelope: &Envelope, tag: &str, plaintext: Vec<u8>) -> Message {
    match String::from_utf8(plaintext) {
        Ok(content) => Message::new(&envelope.source, content, envelope.timestamp, tag),
        Err(_) => Message::undecryptable(&envelope.source, envelope.timestamp, tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(source: &str, kind: u32, timestamp: u64) -> Envelope {
        Envelope {
            source: source.to_string(),
            kind,
            timestamp,
            ..Envelope::default()
        }
    }

    #[test]
    fn test_unread_counts_ciphertexts_per_sender() {
        let mut unread = BTreeMap::new();
        count_unread(&mut unread, &envelope("bob", CIPHERTEXT_TYPE, 10));
        count_unread(&mut unread, &envelope("bob", CIPHERTEXT_TYPE, 5));
        count_unread(&mut unread, &envelope("carol", CIPHERTEXT_TYPE, 7));
        count_unread(&mut unread, &envelope("carol", 3, 99));

        assert_eq!(unread["bob"], UnreadCount { count: 2, latest: 10 });
        assert_eq!(unread["carol"], UnreadCount { count: 1, latest: 7 });
    }

    #[test]
    fn test_non_utf8_plaintext_becomes_placeholder() {
        let from_bob = envelope("bob", CIPHERTEXT_TYPE, 1);

        assert_eq!(to_message(&from_bob, "chat", b"hi".to_vec()).content, "hi");
        assert!(to_message(&from_bob, "chat", vec![0xFF, 0xFE]).is_undecryptable());
    }
}
