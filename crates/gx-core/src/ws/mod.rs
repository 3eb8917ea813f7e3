//! WebSocket transport: connection task, outbound sender, state events.

pub mod client;

pub use client::{OnMessageCallback, OnStateCallback, WsConnConfig, WsConnection, WsSender};

use async_trait::async_trait;

use crate::error::Result;

/// Connection-state events reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake completed; frames flow.
    Active,
    /// The socket went away without a local shutdown request.
    Inactive,
}

/// Outbound side of a transport as seen by the streaming layer.
///
/// Implementations must not wait on network I/O: `send_text` only hands the
/// frame to the connection and fails with
/// [`GxError::Transmission`](crate::error::GxError::Transmission) when that is
/// not possible. `Ok` means the frame was queued, not that it was written:
/// frames still queued when the socket drops are discarded with a warning
/// before [`ConnectionState::Inactive`] is reported.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, frame: String) -> Result<()>;
}
