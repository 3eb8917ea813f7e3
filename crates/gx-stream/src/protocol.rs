//! Venue-specific strategies plugged into the generic streaming client.

use gx_core::error::Result;
use serde_json::Value;

/// Payload handed to the connection-inactive handler.
pub const DISCONNECT_MESSAGE: &str = "WebSocket Client disconnected!";

/// How a venue names channels on the wire and in its feed messages.
///
/// The streaming service, subscription cache and router are generic over this
/// trait; a venue client is just an implementation plus
/// [`StreamingClient`](crate::client::StreamingClient).
pub trait StreamingProtocol: Send + Sync + 'static {
    /// Short label used in log lines.
    fn name(&self) -> &str;

    /// Text frame asking the venue to start sending `channel`.
    fn subscribe_message(&self, channel: &str) -> Result<String>;

    /// Text frame asking the venue to stop sending `channel`.
    fn unsubscribe_message(&self, channel: &str) -> Result<String>;

    /// Channel key of an inbound message.
    fn channel_name<'a>(&self, message: &'a Value) -> Result<&'a str>;

    /// Payload passed to the connection-inactive handler.
    fn disconnect_message(&self) -> &'static str {
        DISCONNECT_MESSAGE
    }
}
