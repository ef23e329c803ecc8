//! Error types for the chat widget.

use thiserror::Error;

/// Crate error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid backend URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket handshake or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The outbound half of the channel is gone.
    #[error("Channel closed")]
    ChannelClosed,

    /// The view task has already shut down.
    #[error("View {0} is not mounted")]
    ViewNotMounted(String),
}

/// Result type alias for chat operations.
pub type Result<T> = std::result::Result<T, Error>;
