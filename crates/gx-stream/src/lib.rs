//! # gx-stream
//!
//! Subscription multiplexing over a single market-data WebSocket.
//!
//! ## Architecture
//!
//! A venue is described by a [`protocol::StreamingProtocol`] implementation
//! (request codec + channel-key extractor). The generic
//! [`client::StreamingClient`] shares one transport between any number of
//! consumers:
//!
//! - [`cache`] — at most one upstream subscribe per channel
//! - [`service`] — channel registry and inbound router
//! - [`channel`] — broadcast-backed per-channel consumer streams
//! - [`notifier`] — connection-inactive handler dispatch
//! - [`gdax`] — the GDAX / Coinbase Exchange feed protocol

pub mod cache;
pub mod channel;
pub mod client;
pub mod gdax;
pub mod notifier;
pub mod protocol;
pub mod service;

#[cfg(test)]
mod test_util;

pub use channel::{ChannelStream, DecodedMessage};
pub use client::{StreamingClient, StreamingClientBuilder};
pub use gdax::{GdaxProtocol, GdaxStreamingClient};
pub use protocol::StreamingProtocol;
