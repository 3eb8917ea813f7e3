//! GDAX (Coinbase Exchange) market data feed.
//!
//! One socket carries every product; channels are product ids such as
//! `BTC-USD`. The venue is known to drop the connection without a close
//! handshake, so callers should register a connection-inactive handler.

pub mod json_parser;

use gx_core::{config::AppConfig, error::Result};
use serde_json::Value;

use crate::client::{StreamingClient, StreamingClientBuilder};
use crate::protocol::StreamingProtocol;

/// Streaming client speaking the GDAX feed protocol.
pub type GdaxStreamingClient = StreamingClient<GdaxProtocol>;

/// GDAX codec and channel-key extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdaxProtocol;

impl StreamingProtocol for GdaxProtocol {
    fn name(&self) -> &str {
        "gdax"
    }

    fn subscribe_message(&self, channel: &str) -> Result<String> {
        json_parser::build_subscribe(channel)
    }

    fn unsubscribe_message(&self, channel: &str) -> Result<String> {
        json_parser::build_unsubscribe(channel)
    }

    fn channel_name<'a>(&self, message: &'a Value) -> Result<&'a str> {
        json_parser::product_id(message)
    }
}

/// Builder for a GDAX client configured from the application config.
pub fn builder(config: &AppConfig) -> StreamingClientBuilder<GdaxProtocol> {
    StreamingClientBuilder::from_config(config, GdaxProtocol)
}
