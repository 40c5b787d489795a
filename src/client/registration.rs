use super::{AccountState, SignalClient, parse_response};
use crate::gateway::{
    ACCOUNTS_PATH, ATTRIBUTES_PATH, AccountAttributes, KEYS_PATH, PUSH_TOKEN_PATH, PreKeyCount,
    PreKeyEntity, PreKeyUpload, PushToken, SignedPreKeyEntity,
};
use crate::keys::{allocate_pre_key_ids, generate_registration_id, generate_signaling_key};
use crate::{
    Error, IdentityKeyPair, IdentityKeyStore, LAST_RESORT_PRE_KEY_ID, PreKeyRecord, PreKeyStore,
    SIGNED_PRE_KEY_ID, SessionCipher, SignedPreKeyRecord, SignedPreKeyStore,
};
use reqwest::Method;
use tracing::{debug, info};

impl<C: SessionCipher> SignalClient<C> {
    /// Resumes a stored account or starts over with a fresh registration.
    ///
    /// The stored account is kept when it belongs to the configured user, is
    /// fully registered and is not older than the configured reset version.
    pub async fn initialize(&mut self) -> Result<AccountState, Error> {
        let same_user =
            self.store.local_username().as_deref() == Some(self.config.username.as_str());
        let reset_current =
            self.store.reset_version().unwrap_or_default() >= self.config.reset_version;

        if same_user && reset_current && self.store.is_local_registered() {
            debug!(parent: &self.span, "Resuming stored account");
            self.state = AccountState::Registered;
            return self.check_remote_pre_keys().await;
        }

        info!(
            parent: &self.span,
            same_user,
            reset_current,
            "Stored state does not match the configured account, starting over"
        );
        self.reset();
        self.register_account().await
    }

    /// Registers the configured user with the relay.
    ///
    /// A registered account is left untouched, except that a missing
    /// signaling key is generated and published on its own.
    pub async fn register_account(&mut self) -> Result<AccountState, Error> {
        if self.store.is_local_registered() {
            if self.store.signaling_key().is_some() {
                debug!(parent: &self.span, "Account already registered");
                if self.state == AccountState::Unregistered {
                    self.state = AccountState::Registered;
                }
                return Ok(self.state);
            }
            return self.publish_new_signaling_key().await;
        }

        self.store.delete_all();
        let registration_id = generate_registration_id()?;
        let signaling_key = generate_signaling_key()?;
        self.store.set_local_registration_id(registration_id);
        self.store.set_local_username(&self.config.username);
        self.store.set_signaling_key(&signaling_key);
        self.store.set_reset_version(self.config.reset_version);

        let attributes = AccountAttributes {
            signaling_key,
            fetches_messages: true,
            registration_id,
            name: self.config.username.clone(),
            voice: false,
        };
        self.gateway
            .call(
                ACCOUNTS_PATH,
                Method::PUT,
                Some(&serde_json::to_value(&attributes)?),
                false,
            )
            .await?;
        info!(parent: &self.span, registration_id, "Account registered");

        self.state = AccountState::Registered;
        self.register_pre_keys(1, self.config.pre_key_batch_size).await
    }

    /// Installs registered before signaling keys existed: add one, keep everything else.
    async fn publish_new_signaling_key(&mut self) -> Result<AccountState, Error> {
        let signaling_key = generate_signaling_key()?;
        self.store.set_signaling_key(&signaling_key);

        let attributes = AccountAttributes {
            signaling_key,
            fetches_messages: true,
            registration_id: self.store.local_registration_id().unwrap_or_default(),
            name: self
                .store
                .local_username()
                .unwrap_or_else(|| self.config.username.clone()),
            voice: false,
        };
        self.gateway
            .call(
                ATTRIBUTES_PATH,
                Method::PUT,
                Some(&serde_json::to_value(&attributes)?),
                false,
            )
            .await?;
        info!(parent: &self.span, "Signaling key added to existing account");

        if self.state == AccountState::Unregistered {
            self.state = AccountState::Registered;
        }
        Ok(self.state)
    }

    /// Generates and publishes `count` one-time pre-keys starting at `start`.
    ///
    /// The identity key pair, the signed pre-key and the last-resort key are
    /// created on first use and republished unchanged afterwards. Ids already
    /// stored are skipped.
    pub async fn register_pre_keys(&mut self, start: u32, count: u32) -> Result<AccountState, Error> {
        let identity = match self.store.identity_key_pair() {
            Some(identity) => identity,
            None => {
                let identity = IdentityKeyPair::generate()?;
                self.store.set_identity_key_pair(&identity);
                identity
            }
        };

        let signed_pre_key = match self.store.load_signed_pre_key(SIGNED_PRE_KEY_ID) {
            Some(signed_pre_key) => signed_pre_key,
            None => {
                let signed_pre_key = SignedPreKeyRecord::generate(SIGNED_PRE_KEY_ID, &identity)?;
                self.store.store_signed_pre_key(&signed_pre_key);
                signed_pre_key
            }
        };

        let last_resort = match self.store.load_pre_key(LAST_RESORT_PRE_KEY_ID) {
            Some(last_resort) => last_resort,
            None => {
                let last_resort = PreKeyRecord::generate(LAST_RESORT_PRE_KEY_ID)?;
                self.store.store_pre_key(&last_resort);
                last_resort
            }
        };

        let ids = allocate_pre_key_ids(start, count as usize, &self.store.stored_pre_key_ids());
        let pre_keys = PreKeyRecord::generate_batch(&ids)?;
        self.store.store_pre_keys(&pre_keys);

        let upload = PreKeyUpload {
            identity_key: identity.public_key().to_base64(),
            signed_pre_key: SignedPreKeyEntity {
                key_id: signed_pre_key.id(),
                public_key: signed_pre_key.public_key().to_base64(),
                signature: signed_pre_key.signature_base64(),
            },
            last_resort_key: PreKeyEntity {
                key_id: last_resort.id(),
                public_key: last_resort.public_key().to_base64(),
            },
            pre_keys: pre_keys
                .iter()
                .map(|pre_key| PreKeyEntity {
                    key_id: pre_key.id(),
                    public_key: pre_key.public_key().to_base64(),
                })
                .collect(),
        };
        self.gateway
            .call(
                KEYS_PATH,
                Method::PUT,
                Some(&serde_json::to_value(&upload)?),
                false,
            )
            .await?;
        info!(parent: &self.span, count = pre_keys.len(), "Pre-keys published");

        self.state = AccountState::Ready;
        Ok(self.state)
    }

    /// Tops up the relay's one-time pre-keys when it is running low.
    pub async fn check_remote_pre_keys(&mut self) -> Result<AccountState, Error> {
        let response = self.gateway.call(KEYS_PATH, Method::GET, None, false).await?;
        let PreKeyCount { count } = parse_response(response, "pre-key count")?;

        if count > self.config.pre_key_refill_threshold {
            debug!(parent: &self.span, count, "Enough pre-keys on the relay");
            self.state = AccountState::Ready;
            return Ok(self.state);
        }

        self.state = AccountState::Replenishing;
        let needed = self.config.pre_key_batch_size.saturating_sub(count);
        info!(parent: &self.span, count, needed, "Replenishing pre-keys");
        self.register_pre_keys(self.store.last_pre_key_index(), needed)
            .await
    }

    /// Registers the device push token with the relay.
    pub async fn save_push_token(&self, token: &str) -> Result<(), Error> {
        if token.trim().is_empty() {
            return Err(Error::server("Push token is empty"));
        }

        let body = PushToken {
            gcm_registration_id: token.to_string(),
        };
        self.gateway
            .call(
                PUSH_TOKEN_PATH,
                Method::PUT,
                Some(&serde_json::to_value(&body)?),
                false,
            )
            .await?;
        Ok(())
    }
}
