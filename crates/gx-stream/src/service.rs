//! Streaming service: the channel registry and the inbound router.
//!
//! ```text
//! transport text frame ──► handle_text ──► serde_json ──► handle_message
//!                                                          │
//!                               protocol.channel_name() ◄──┘
//!                                                          │
//!                               channels[name].publish() ◄─┘
//! ```
//!
//! [`StreamingService::subscribe_channel`] is the generic, non-idempotent
//! primitive: every call sends a subscribe frame and (re)registers the channel.
//! Deduplication of concurrent consumers is the job of
//! [`SubscriptionCache`](crate::cache::SubscriptionCache).

use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use gx_core::error::Result;
use gx_core::ws::Transport;
use tracing::{debug, trace, warn};

use crate::channel::{ChannelSender, ChannelStream, DecodedMessage};
use crate::protocol::StreamingProtocol;

pub struct StreamingService<P> {
    protocol: P,
    transport: Arc<dyn Transport>,
    channels: RwLock<AHashMap<String, ChannelSender>>,
    capacity: usize,
}

impl<P: StreamingProtocol> StreamingService<P> {
    /// `capacity` is the per-channel broadcast buffer and must be non-zero.
    pub fn new(protocol: P, transport: Arc<dyn Transport>, capacity: usize) -> Self {
        Self { protocol, transport, channels: RwLock::new(AHashMap::new()), capacity }
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Whether `channel` is registered with the router.
    pub fn is_channel_active(&self, channel: &str) -> bool {
        self.channels.read().unwrap().contains_key(channel)
    }

    /// Registered sender for `channel`, if any.
    pub fn channel(&self, channel: &str) -> Option<ChannelSender> {
        self.channels.read().unwrap().get(channel).cloned()
    }

    /// Send a subscribe frame for `channel` and register a fresh stream for it.
    ///
    /// The first consumer is created before registration so it cannot miss a
    /// message routed right after the frame goes out. Nothing is registered if
    /// building or sending the frame fails.
    pub async fn subscribe_channel(&self, channel: &str) -> Result<(ChannelSender, ChannelStream)> {
        let frame = self.protocol.subscribe_message(channel)?;

        let sender = ChannelSender::new(channel, self.capacity);
        let stream = sender.stream();
        let replaced = self.channels.write().unwrap().insert(channel.to_string(), sender.clone());

        if let Err(e) = self.transport.send_text(frame).await {
            let mut channels = self.channels.write().unwrap();
            match replaced {
                Some(previous) => channels.insert(channel.to_string(), previous),
                None => channels.remove(channel),
            };
            return Err(e);
        }

        debug!("[{}] subscribed {channel}", self.protocol.name());
        Ok((sender, stream))
    }

    /// Send an unsubscribe frame for `channel` and drop it from the router.
    ///
    /// Returns `false` without sending anything if the channel is not
    /// registered. On failure the registration is left untouched.
    pub async fn unsubscribe_channel(&self, channel: &str) -> Result<bool> {
        if !self.is_channel_active(channel) {
            return Ok(false);
        }
        let frame = self.protocol.unsubscribe_message(channel)?;
        self.transport.send_text(frame).await?;
        self.channels.write().unwrap().remove(channel);
        debug!("[{}] unsubscribed {channel}", self.protocol.name());
        Ok(true)
    }

    /// Registered channel names.
    pub fn active_channels(&self) -> Vec<String> {
        self.channels.read().unwrap().keys().cloned().collect()
    }

    /// Decode a raw text frame and route it.
    ///
    /// Frames that are not valid JSON are dropped with a warning.
    pub fn handle_text(&self, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => {
                self.handle_message(Arc::new(value));
            }
            Err(e) => warn!("[{}] dropping undecodable frame: {e}", self.protocol.name()),
        }
    }

    /// Route one decoded message to the consumers of its channel.
    ///
    /// Returns the number of consumers it was queued for. Messages without a
    /// channel key are dropped with a warning; messages for unregistered
    /// channels are dropped silently.
    pub fn handle_message(&self, message: DecodedMessage) -> usize {
        let sender = match self.protocol.channel_name(&message) {
            Ok(name) => match self.channel(name) {
                Some(sender) => sender,
                None => {
                    trace!("[{}] no subscriber for {name}", self.protocol.name());
                    return 0;
                }
            },
            Err(e) => {
                warn!("[{}] dropping message: {e}", self.protocol.name());
                return 0;
            }
        };

        let delivered = sender.publish(message);
        if delivered == 0 {
            trace!("[{}] {} has no live consumers", self.protocol.name(), sender.channel());
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdax::GdaxProtocol;
    use crate::test_util::RecordingTransport;
    use gx_core::error::GxError;
    use serde_json::json;

    fn service() -> (Arc<RecordingTransport>, StreamingService<GdaxProtocol>) {
        let transport = Arc::new(RecordingTransport::default());
        let svc = StreamingService::new(GdaxProtocol, transport.clone(), 16);
        (transport, svc)
    }

    #[tokio::test]
    async fn subscribe_channel_sends_and_registers() {
        let (transport, svc) = service();
        let (_sender, mut stream) = svc.subscribe_channel("BTC-USD").await.unwrap();

        assert!(svc.is_channel_active("BTC-USD"));
        assert_eq!(transport.frames(), vec![r#"{"type":"subscribe","product_id":"BTC-USD"}"#]);

        svc.handle_text(r#"{"type":"match","product_id":"BTC-USD","price":"100"}"#);
        assert_eq!(stream.try_recv().unwrap()["price"], "100");
    }

    #[tokio::test]
    async fn generic_subscribe_is_not_idempotent() {
        let (transport, svc) = service();
        svc.subscribe_channel("BTC-USD").await.unwrap();
        svc.subscribe_channel("BTC-USD").await.unwrap();
        assert_eq!(transport.count_of(r#"{"type":"subscribe","product_id":"BTC-USD"}"#), 2);
    }

    #[tokio::test]
    async fn failed_send_registers_nothing() {
        let (transport, svc) = service();
        transport.set_failing(true);
        let err = svc.subscribe_channel("BTC-USD").await.unwrap_err();
        assert!(matches!(err, GxError::Transmission(_)));
        assert!(!svc.is_channel_active("BTC-USD"));
        assert!(svc.active_channels().is_empty());
    }

    #[tokio::test]
    async fn failed_resubscribe_keeps_previous_registration() {
        let (transport, svc) = service();
        let (_sender, mut stream) = svc.subscribe_channel("BTC-USD").await.unwrap();
        transport.set_failing(true);
        assert!(svc.subscribe_channel("BTC-USD").await.is_err());

        assert_eq!(svc.handle_message(Arc::new(json!({"product_id": "BTC-USD"}))), 1);
        assert!(stream.try_recv().is_some());
    }

    #[tokio::test]
    async fn unsubscribe_channel_sends_frame_once() {
        let (transport, svc) = service();
        svc.subscribe_channel("ETH-USD").await.unwrap();

        assert!(svc.unsubscribe_channel("ETH-USD").await.unwrap());
        assert!(!svc.unsubscribe_channel("ETH-USD").await.unwrap());
        assert!(!svc.is_channel_active("ETH-USD"));
        assert_eq!(transport.count_of(r#"{"type":"unsubscribe","product_id":"ETH-USD"}"#), 1);
    }

    #[tokio::test]
    async fn router_drops_unknown_and_malformed() {
        let (_transport, svc) = service();
        let (_sender, mut btc) = svc.subscribe_channel("BTC-USD").await.unwrap();

        assert_eq!(svc.handle_message(Arc::new(json!({"type": "heartbeat"}))), 0);
        assert_eq!(svc.handle_message(Arc::new(json!({"product_id": "LTC-USD"}))), 0);
        assert_eq!(svc.handle_message(Arc::new(json!({"product_id": 7}))), 0);
        svc.handle_text("not json");
        assert!(btc.try_recv().is_none());

        assert_eq!(svc.handle_message(Arc::new(json!({"product_id": "BTC-USD"}))), 1);
        assert!(btc.try_recv().is_some());
    }
}
