//! Channel error types.

use thiserror::Error;

/// Channel error type.
///
/// None of these reach callers of the connection loop; they are logged and
/// folded into the reconnect path. Construction and frame parsing return them.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Channel result type.
pub type Result<T> = std::result::Result<T, ChannelError>;
