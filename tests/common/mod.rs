use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Span;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zealot_relay::{
    CipherError, CiphertextKind, CiphertextMessage, ClientConfig, IdentityKey, IdentityKeyPair,
    Messenger, PreKeyBundle, PreKeyRecord, ProtocolAddress, ProtocolStoreCapability,
    SIGNED_PRE_KEY_ID, SessionCipher, SessionRecord, SignedPreKeyRecord,
};

const SIGNAL_TAG: u8 = b'W';
const PRE_KEY_TAG: u8 = b'P';

/// Stand-in ratchet with a transparent wire format.
///
/// Ordinary messages are `W | plaintext`; pre-key messages are
/// `P | sender identity (64) | plaintext`. Session state is the remote
/// registration id, big-endian.
#[derive(Default)]
pub struct FakeCipher {
    seen: Mutex<HashSet<Vec<u8>>>,
    attempts: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeCipher {
    /// Decrypt paths tried so far, in order.
    pub fn attempts(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.attempts)
    }

    fn record(&self, attempt: &'static str) {
        self.attempts.lock().unwrap().push(attempt);
    }

    fn check_duplicate(&self, ciphertext: &[u8]) -> Result<(), CipherError> {
        if self.seen.lock().unwrap().insert(ciphertext.to_vec()) {
            Ok(())
        } else {
            Err(CipherError::DuplicateMessage)
        }
    }
}

impl SessionCipher for FakeCipher {
    fn process_pre_key_bundle(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
        bundle: &PreKeyBundle,
    ) -> Result<(), CipherError> {
        store.save_identity(address, &bundle.identity_key);
        store.store_session(
            address,
            &SessionRecord::new(bundle.registration_id.to_be_bytes().to_vec()),
        );
        Ok(())
    }

    fn encrypt(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, CipherError> {
        if !store.contains_session(address) {
            return Err(CipherError::NoSession);
        }
        let mut body = vec![SIGNAL_TAG];
        body.extend_from_slice(plaintext);
        Ok(CiphertextMessage {
            kind: CiphertextKind::Signal,
            body,
        })
    }

    fn decrypt_signal_message(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        self.record("signal");
        let Some((&SIGNAL_TAG, plaintext)) = ciphertext.split_first() else {
            return Err(CipherError::InvalidMessage("not a signal message".to_string()));
        };
        if !store.contains_session(address) {
            return Err(CipherError::NoSession);
        }
        self.check_duplicate(ciphertext)?;
        Ok(plaintext.to_vec())
    }

    fn decrypt_pre_key_message(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        self.record("prekey");
        if ciphertext.len() < 65 || ciphertext[0] != PRE_KEY_TAG {
            return Err(CipherError::InvalidMessage("not a pre-key message".to_string()));
        }
        let identity = IdentityKey::from_bytes(&ciphertext[1..65])
            .map_err(|err| CipherError::InvalidKey(err.to_string()))?;
        if !store.is_trusted_identity(address, &identity) {
            return Err(CipherError::UntrustedIdentity(address.to_string()));
        }
        self.check_duplicate(ciphertext)?;

        store.save_identity(address, &identity);
        store.store_session(address, &SessionRecord::new(0u32.to_be_bytes().to_vec()));
        Ok(ciphertext[65..].to_vec())
    }

    fn remote_registration_id(
        &self,
        store: &dyn ProtocolStoreCapability,
        address: &ProtocolAddress,
    ) -> Result<u32, CipherError> {
        let record = store.load_session(address);
        if record.is_fresh() {
            return Err(CipherError::NoSession);
        }
        let bytes = <[u8; 4]>::try_from(record.state())
            .map_err(|_| CipherError::Other("corrupt session".to_string()))?;
        Ok(u32::from_be_bytes(bytes))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(server: &MockServer, data_dir: &Path) -> ClientConfig {
    ClientConfig::new(server.uri(), "alice", "access-token", data_dir)
}

pub fn messenger() -> (Messenger<FakeCipher>, Arc<Mutex<Vec<&'static str>>>) {
    let cipher = FakeCipher::default();
    let attempts = cipher.attempts();
    (Messenger::new(cipher, Span::none()), attempts)
}

/// Accepts account creation and key upload, and reports a full key supply.
pub async fn mount_registration(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path("/v1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v2/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 100})))
        .mount(server)
        .await;
}

pub async fn mount_bootstrap(server: &MockServer, timestamp: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/accounts/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"timestamp": timestamp})))
        .mount(server)
        .await;
}

/// A relay key bundle response for a contact owning `identity`.
pub fn bundle_json(identity: &IdentityKeyPair, registration_id: u32) -> Value {
    let signed = SignedPreKeyRecord::generate(SIGNED_PRE_KEY_ID, identity).unwrap();
    let pre_key = PreKeyRecord::generate(5).unwrap();

    json!({
        "identityKey": identity.public_key().to_base64(),
        "devices": [{
            "deviceId": 1,
            "registrationId": registration_id,
            "preKey": {"keyId": pre_key.id(), "publicKey": pre_key.public_key().to_base64()},
            "signedPreKey": {
                "keyId": signed.id(),
                "publicKey": signed.public_key().to_base64(),
                "signature": signed.signature_base64(),
            },
        }],
    })
}

pub async fn mount_bundle(server: &MockServer, contact: &str, bundle: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/keys/{contact}/1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle))
        .mount(server)
        .await;
}

pub fn signal_body(plaintext: &str) -> String {
    let mut body = vec![SIGNAL_TAG];
    body.extend_from_slice(plaintext.as_bytes());
    STANDARD.encode(body)
}

pub fn pre_key_body(sender: &IdentityKeyPair, plaintext: &str) -> String {
    let mut body = vec![PRE_KEY_TAG];
    body.extend_from_slice(&sender.public_key().to_bytes());
    body.extend_from_slice(plaintext.as_bytes());
    STANDARD.encode(body)
}

pub fn envelope(source: &str, message: &str, timestamp: u64, tag: &str) -> Value {
    json!({
        "message": message,
        "source": source,
        "sourceDevice": 1,
        "type": 1,
        "timestamp": timestamp,
        "tag": tag,
    })
}
