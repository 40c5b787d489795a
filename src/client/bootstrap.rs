use super::{SignalClient, parse_response};
use crate::gateway::{KEYS_PATH, PreKeyResponse, PreKeyResponseItem};
use crate::{
    Contact, DEFAULT_DEVICE_ID, Error, IdentityKey, PreKeyBundle, SessionCipher, SessionStore,
    X25519PublicKey,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::Signature;
use tracing::info;

impl<C: SessionCipher> SignalClient<C> {
    /// Fetches the contact's key bundle and builds a brand-new session from it.
    ///
    /// Any pinned identity and session for the contact are dropped first, so
    /// every call is a fresh handshake.
    pub async fn request_pre_keys(&self, contact: &Contact) -> Result<(), Error> {
        let path = format!("{KEYS_PATH}/{}/{DEFAULT_DEVICE_ID}", contact.username);
        let query = match contact.connection() {
            Some((user_id, token)) => vec![("userId", user_id), ("userConnectionAccessToken", token)],
            None => Vec::new(),
        };

        let response = match self.gateway.get_with_query(&path, &query).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => {
                return Err(Error::ContactNotFound(contact.username.clone()));
            }
            Err(err) => return Err(err),
        };
        let response: PreKeyResponse = parse_response(response, "pre-key bundle")?;
        let Some(device) = response.devices.first() else {
            return Err(Error::ContactNotFound(contact.username.clone()));
        };
        let bundle = bundle_from_device(&response.identity_key, device)?;
        bundle.verify()?;

        let address = contact.address();
        self.store.remove_identity(&address);
        self.store.delete_session(&address);
        self.cipher
            .process_pre_key_bundle(&self.store, &address, &bundle)?;
        info!(parent: &self.span, %address, "Session bootstrapped from fetched bundle");

        Ok(())
    }
}

fn bundle_from_device(identity_key: &str, device: &PreKeyResponseItem) -> Result<PreKeyBundle, Error> {
    let malformed = |err: Error| Error::server(format!("Malformed pre-key bundle: {err}"));

    let identity_key = IdentityKey::from_base64(identity_key).map_err(malformed)?;
    let pre_key = match &device.pre_key {
        Some(pre_key) => Some((
            pre_key.key_id,
            X25519PublicKey::from_base64(&pre_key.public_key).map_err(malformed)?,
        )),
        None => None,
    };
    let signed_pre_key =
        X25519PublicKey::from_base64(&device.signed_pre_key.public_key).map_err(malformed)?;
    let signature = STANDARD
        .decode(&device.signed_pre_key.signature)
        .ok()
        .and_then(|bytes| <[u8; 64]>::try_from(bytes.as_slice()).ok())
        .map(|bytes| Signature::from_bytes(&bytes))
        .ok_or_else(|| Error::server("Malformed pre-key bundle: invalid signature"))?;

    Ok(PreKeyBundle {
        registration_id: device.registration_id,
        device_id: device.device_id,
        pre_key,
        signed_pre_key_id: device.signed_pre_key.key_id,
        signed_pre_key,
        signed_pre_key_signature: signature,
        identity_key,
    })
}
