use super::{SignalClient, parse_response};
use crate::archive::unix_seconds;
use crate::gateway::{
    CIPHERTEXT_TYPE, MESSAGES_PATH, OutgoingMessage, OutgoingMessageList, SendResponse,
};
use crate::{Contact, DEFAULT_DEVICE_ID, Error, Message, SessionCipher};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use tracing::{info, warn};

impl<C: SessionCipher> SignalClient<C> {
    /// Encrypts `text` for `contact`, delivers it and archives the sent copy.
    ///
    /// When the relay answers with stale devices, the contact's bundle is
    /// fetched again and the message re-encrypted and resent, at most
    /// `max_stale_device_retries` times.
    pub async fn send_message(
        &self,
        contact: &Contact,
        text: &str,
        tag: &str,
        silent: bool,
    ) -> Result<(), Error> {
        let address = contact.address();
        let path = format!("{MESSAGES_PATH}/{}", contact.username);
        let mut retries = 0;

        loop {
            let timestamp = self.gateway.request_server_timestamp().await?;
            let ciphertext = self.cipher.encrypt(&self.store, &address, text.as_bytes())?;
            let registration_id = self.cipher.remote_registration_id(&self.store, &address)?;

            let (user_id, user_connection_access_token) = match contact.connection() {
                Some((user_id, token)) => (Some(user_id.to_string()), Some(token.to_string())),
                None => (None, None),
            };
            let body = OutgoingMessageList {
                messages: vec![OutgoingMessage {
                    kind: CIPHERTEXT_TYPE,
                    destination: contact.username.clone(),
                    content: String::new(),
                    timestamp,
                    destination_device_id: DEFAULT_DEVICE_ID,
                    destination_registration_id: registration_id,
                    body: STANDARD.encode(&ciphertext.body),
                    tag: tag.to_string(),
                    silent,
                    user_id,
                    user_connection_access_token,
                }],
            };

            let response = self
                .gateway
                .call_at(&path, Method::PUT, Some(&serde_json::to_value(&body)?), timestamp)
                .await?;
            let response: SendResponse = parse_response(response, "send")?;

            let Some(stale_devices) = response.stale_devices else {
                break;
            };
            if retries >= self.config.max_stale_device_retries {
                warn!(parent: &self.span, %address, ?stale_devices, "Stale devices persist, giving up");
                return Err(Error::server(format!(
                    "Relay still reports stale devices for {} after {retries} resend(s)",
                    contact.username
                )));
            }
            retries += 1;
            info!(parent: &self.span, %address, ?stale_devices, "Stale devices reported, refreshing session");
            self.request_pre_keys(contact).await?;
        }

        let now = unix_seconds();
        let mut sent = Message::new(&self.config.username, text.to_string(), now * 1000, tag);
        sent.saved_timestamp = now;
        self.archive.append(&contact.username, tag, sent);

        Ok(())
    }
}
