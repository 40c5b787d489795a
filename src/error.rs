use crate::CipherError;
use std::fmt;

/// Stable rejection codes surfaced to a hosting application.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    WrongConfig,
    ServerFailed,
    NativeFailed,
    AddContactFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongConfig => "ERR_WRONG_CONFIG",
            Self::ServerFailed => "ERR_SERVER_FAILED",
            Self::NativeFailed => "ERR_NATIVE_FAILED",
            Self::AddContactFailed => "ERR_ADD_CONTACT_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while driving the account against the relay.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// A required configuration field is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The relay could not be reached or answered with an unexpected status.
    #[error("Server request failed (status {status:?}): {message}")]
    Server {
        status: Option<u16>,
        message: String,
    },

    /// A local cryptographic or parsing step failed.
    #[error("Native operation failed: {0}")]
    Native(String),

    /// The relay has no key bundle for the requested contact.
    #[error("User {0} doesn't exist")]
    ContactNotFound(String),

    /// Random number generation failed.
    #[error("Random number generation failed")]
    Random,

    /// Serialization or deserialization failed.
    #[error("Serialization/deserialization failed: {0}")]
    Serde(String),
}

impl Error {
    /// Returns the code reported for this error at the application boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::WrongConfig,
            Self::Server { .. } => ErrorCode::ServerFailed,
            Self::ContactNotFound(_) => ErrorCode::AddContactFailed,
            Self::Native(_) | Self::Random | Self::Serde(_) => ErrorCode::NativeFailed,
        }
    }

    pub(crate) fn server(message: impl Into<String>) -> Self {
        Self::Server {
            status: None,
            message: message.into(),
        }
    }

    /// True when the relay answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Server { status: Some(404), .. })
    }
}

impl From<CipherError> for Error {
    fn from(value: CipherError) -> Self {
        Self::Native(value.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Server {
            status: value.status().map(|status| status.as_u16()),
            message: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value.to_string())
    }
}
