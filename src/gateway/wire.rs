//! JSON bodies exchanged with the relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ACCOUNTS_PATH: &str = "/v1/accounts";
pub const ATTRIBUTES_PATH: &str = "/v1/accounts/attributes";
pub const BOOTSTRAP_PATH: &str = "/v1/accounts/bootstrap";
pub const PUSH_TOKEN_PATH: &str = "/v1/accounts/gcm";
pub const KEYS_PATH: &str = "/v2/keys";
pub const MESSAGES_PATH: &str = "/v1/messages";

/// Envelope type of an ordinary ciphertext.
pub const CIPHERTEXT_TYPE: u32 = 1;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountAttributes {
    pub signaling_key: String,
    pub fetches_messages: bool,
    pub registration_id: u32,
    pub name: String,
    pub voice: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PreKeyEntity {
    pub key_id: u32,
    pub public_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedPreKeyEntity {
    pub key_id: u32,
    pub public_key: String,
    pub signature: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PreKeyUpload {
    pub identity_key: String,
    pub signed_pre_key: SignedPreKeyEntity,
    pub last_resort_key: PreKeyEntity,
    pub pre_keys: Vec<PreKeyEntity>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct PreKeyCount {
    #[serde(default)]
    pub count: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PreKeyResponse {
    pub identity_key: String,
    #[serde(default)]
    pub devices: Vec<PreKeyResponseItem>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PreKeyResponseItem {
    pub device_id: u32,
    pub registration_id: u32,
    #[serde(default)]
    pub pre_key: Option<PreKeyEntity>,
    pub signed_pre_key: SignedPreKeyEntity,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct OutgoingMessageList {
    pub messages: Vec<OutgoingMessage>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutgoingMessage {
    #[serde(rename = "type")]
    pub kind: u32,
    pub destination: String,
    pub content: String,
    pub timestamp: u64,
    pub destination_device_id: u32,
    pub destination_registration_id: u32,
    pub body: String,
    pub tag: String,
    pub silent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_connection_access_token: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendResponse {
    #[serde(default)]
    pub stale_devices: Option<Vec<u32>>,
}

/// Pending envelopes; entries are parsed one by one so a bad entry can be skipped.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct IncomingMessageList {
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// One encrypted message unit as queued by the relay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Envelope {
    /// Base64 ciphertext; empty for the relay's echo of our own sends.
    pub message: String,
    pub source: String,
    pub source_device: u32,
    #[serde(rename = "type")]
    pub kind: u32,
    /// Relay timestamp in milliseconds; also the acknowledgment key.
    pub timestamp: u64,
    pub tag: String,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct BootstrapResponse {
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PushToken {
    pub gcm_registration_id: String,
}
