//! Typed error definitions for the GDAX streaming client.
//!
//! Provides [`GxError`] for failures that callers of the subscription API need
//! to tell apart. All variants implement `std::error::Error` via `thiserror`, so
//! they integrate with `anyhow::Result` in the runner.

use thiserror::Error;

/// Domain-specific errors for the streaming client.
#[derive(Debug, Error)]
pub enum GxError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection or handshake error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Rejected channel name (e.g. empty product id).
    #[error("invalid channel: {0:?}")]
    InvalidChannel(String),

    /// Inbound message could not be decoded or carries no channel key.
    #[error("decode error: {0}")]
    Decode(String),

    /// Building an outbound request frame failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbound frame could not be handed to the connection.
    #[error("transmission error: {0}")]
    Transmission(String),
}

/// Result alias used throughout the streaming crates.
pub type Result<T> = std::result::Result<T, GxError>;
