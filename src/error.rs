//! Error types for the public seams of the crate.
//!
//! Storage code keeps using `anyhow` internally; these enums are what the
//! API client, the chat repository and the auth layer hand back to callers.

use thiserror::Error;

/// Failure of a single remote API call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Non-2xx response. `message` comes from the body's `error`/`message` field
    /// when the server sent one, otherwise from the status line.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection failure, timeout or any other transport-level problem
    #[error("transport error: {0}")]
    Transport(String),

    /// 2xx response whose body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Terminal error of a chat repository operation. `Display` is the message shown
/// to the user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// The server answered but refused the operation (failure-flagged payload)
    #[error("{0}")]
    Rejected(String),

    /// HTTP or transport failure with no local data to fall back on
    #[error("Network error: {0}")]
    Network(String),

    /// Local cache failure that could not be swallowed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub(crate) fn network(err: &ApiError) -> Self {
        match err {
            ApiError::Http { message, .. } => RepositoryError::Network(message.clone()),
            ApiError::Transport(detail) | ApiError::Decode(detail) => {
                RepositoryError::Network(detail.clone())
            }
        }
    }
}

impl From<anyhow::Error> for RepositoryError {
    fn from(err: anyhow::Error) -> Self {
        RepositoryError::Storage(format!("{:#}", err))
    }
}
