/*
[INPUT]:  Error sources (WebSocket transport, serialization, URL building, configuration)
[OUTPUT]: Structured error type with retry hints
[POS]:    Error handling layer - unified error type for the entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use thiserror::Error;

/// Main error type for the Binance feed adapter
#[derive(Error, Debug)]
pub enum FeedError {
    /// `connect()` was called before any stream was registered
    #[error("No streams registered, subscribe before connecting")]
    NoStreams,

    /// A connection is already being opened or is open
    #[error("Connection already active")]
    AlreadyConnected,

    /// The client was closed while the operation was in flight
    #[error("Connection closed")]
    Closed,

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Handshake did not complete in time
    #[error("Connection timeout after {millis}ms")]
    Timeout { millis: u64 },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reconnect ceiling reached
    #[error("Gave up reconnecting after {attempts} attempts")]
    MaxReconnectAttempts { attempts: u32 },
}

impl FeedError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeedError::WebSocket(_) | FeedError::Timeout { .. }
        )
    }

    pub(crate) fn websocket(err: impl std::fmt::Display) -> Self {
        FeedError::WebSocket(err.to_string())
    }
}

/// Result type alias for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;
