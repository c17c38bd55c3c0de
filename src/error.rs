//! Error types for MailBridge

use thiserror::Error;

/// Result type alias for MailBridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in MailBridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// No credential (or no refresh token) on file for the user.
    ///
    /// Expected, user-facing state — callers report it as "not authorized"
    /// rather than logging it at error level.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Non-200 response from the authorization server or API.
    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Unusable redirect hitting the local callback server.
    #[error("Callback error: {0}")]
    Callback(#[from] crate::oauth::CallbackError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is the expected "user has not authorized yet" state.
    pub fn is_not_authorized(&self) -> bool {
        matches!(self, Error::NotAuthorized(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
