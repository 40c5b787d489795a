mod wire;
pub use wire::{CIPHERTEXT_TYPE, Envelope};
pub(crate) use wire::*;

use crate::Error;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{Span, debug, warn};

/// Header carrying the relay-issued anti-replay timestamp.
pub const TIMESTAMP_HEADER: &str = "Token-Timestamp";

// Reserved for request signing; the relay accepts these fixed values.
const ID_ADDRESS_HEADER: &str = "Token-ID-Address";
const SIGNATURE_HEADER: &str = "Token-Signature";

/// True for 2xx except 204, and for 410 which carries stale-device payloads.
pub fn is_valid_status(status: StatusCode) -> bool {
    (status.is_success() && status != StatusCode::NO_CONTENT) || status == StatusCode::GONE
}

/// Authenticated JSON client for the key-distribution and relay service.
pub struct ServerGateway {
    client: Client,
    host: String,
    access_token: String,
    span: Span,
}

impl ServerGateway {
    pub fn new(
        host: &str,
        access_token: &str,
        timeout: Duration,
        span: Span,
    ) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            span,
        })
    }

    /// Sends a request, first fetching an anti-replay timestamp when `timestamped`.
    pub async fn call(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        timestamped: bool,
    ) -> Result<Value, Error> {
        let timestamp = if timestamped {
            Some(self.request_server_timestamp().await?)
        } else {
            None
        };
        self.send(method, path, &[], body, timestamp).await
    }

    /// Sends a request carrying a timestamp obtained earlier.
    pub async fn call_at(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        timestamp: u64,
    ) -> Result<Value, Error> {
        self.send(method, path, &[], body, Some(timestamp)).await
    }

    /// Issues a GET with query parameters.
    pub async fn get_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, Error> {
        self.send(Method::GET, path, query, None, None).await
    }

    /// Performs the bootstrap round trip and returns the relay's timestamp.
    pub async fn request_server_timestamp(&self) -> Result<u64, Error> {
        let response = self
            .send(Method::GET, BOOTSTRAP_PATH, &[], None, None)
            .await?;
        let bootstrap: BootstrapResponse = serde_json::from_value(response)
            .map_err(|err| Error::server(format!("Malformed bootstrap response: {err}")))?;

        Ok(bootstrap.timestamp)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        timestamp: Option<u64>,
    ) -> Result<Value, Error> {
        let url = format!("{}{}", self.host, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(ID_ADDRESS_HEADER, "address")
            .header(SIGNATURE_HEADER, "signature");
        if let Some(timestamp) = timestamp {
            request = request.header(TIMESTAMP_HEADER, timestamp.to_string());
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            warn!(parent: &self.span, %method, path, error = %err, "Relay request failed");
            Error::from(err)
        })?;
        let status = response.status();
        debug!(parent: &self.span, %method, path, status = status.as_u16(), "Relay responded");

        let text = response.text().await?;
        if !is_valid_status(status) {
            let message = if text.trim().is_empty() {
                status.to_string()
            } else {
                text
            };
            return Err(Error::Server {
                status: Some(status.as_u16()),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&text).map_err(|err| Error::Server {
            status: Some(status.as_u16()),
            message: format!("Malformed response body: {err}"),
        })
    }
}
