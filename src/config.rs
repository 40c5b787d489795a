use crate::Error;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Settings the hosting application provides when initializing the messenger.
///
/// Only `host`, `username` and `access_token` are required; the remaining
/// fields are tunables with working defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the relay, e.g. `https://relay.example.com`.
    pub host: String,
    pub username: String,
    pub access_token: String,
    /// Directory holding the protocol and message namespaces.
    pub data_dir: PathBuf,
    /// Bumping this above the stored value wipes local state on the next start.
    pub reset_version: u32,
    pub request_timeout_secs: u64,
    pub pre_key_batch_size: u32,
    pub pre_key_refill_threshold: u32,
    pub max_stale_device_retries: u32,
}

impl ClientConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        access_token: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            access_token: access_token.into(),
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Rejects a configuration that is missing a required field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("Host is missing".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(Error::Config("Username is missing".to_string()));
        }
        if self.access_token.trim().is_empty() {
            return Err(Error::Config("Access token is missing".to_string()));
        }
        if self.pre_key_refill_threshold >= self.pre_key_batch_size {
            return Err(Error::Config(
                "Pre-key refill threshold must be below the batch size".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            access_token: String::new(),
            data_dir: PathBuf::from("."),
            reset_version: 0,
            request_timeout_secs: 30,
            pre_key_batch_size: 100,
            pre_key_refill_threshold: 10,
            max_stale_device_retries: 1,
        }
    }
}
