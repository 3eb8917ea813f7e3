//! Streaming client facade: one socket, many per-channel consumer streams.
//!
//! [`StreamingClient`] wires together the transport ([`WsConnection`]), the
//! [`StreamingService`] (registry + router), the [`SubscriptionCache`] and the
//! [`DisconnectNotifier`]:
//!
//! ```text
//! WsConnection ──text──► StreamingService::handle_text ──► ChannelStream(s)
//!              ──state─► DisconnectNotifier ──spawn──► inactive handler
//! subscribe() ──► SubscriptionCache ──► StreamingService ──► WsSender
//! ```
//!
//! The client never resubscribes on its own. After a disconnect the caller
//! decides whether to build a new client and subscribe again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gx_core::config::{AppConfig, DEFAULT_CHANNEL_CAPACITY};
use gx_core::error::{GxError, Result};
use gx_core::ws::{
    ConnectionState, OnMessageCallback, OnStateCallback, Transport, WsConnConfig, WsConnection,
};
use serde_json::Value;
use tracing::info;

use crate::cache::SubscriptionCache;
use crate::channel::{ChannelStream, DecodedMessage};
use crate::notifier::{DisconnectNotifier, OnInactiveCallback};
use crate::protocol::StreamingProtocol;
use crate::service::StreamingService;

/// Builder for a connected [`StreamingClient`].
pub struct StreamingClientBuilder<P> {
    conn: WsConnConfig,
    protocol: P,
    capacity: usize,
    on_inactive: Option<OnInactiveCallback>,
}

impl<P: StreamingProtocol> StreamingClientBuilder<P> {
    pub fn new(url: impl Into<String>, protocol: P) -> Self {
        Self {
            conn: WsConnConfig::new(url),
            protocol,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            on_inactive: None,
        }
    }

    pub fn from_config(config: &AppConfig, protocol: P) -> Self {
        Self::new(config.ws_url.clone(), protocol)
            .channel_capacity(config.channel_capacity)
            .extra_headers(config.extra_headers.clone())
            .ping_interval(config.ping_interval())
    }

    /// Messages buffered per consumer before it starts lagging.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.conn.ping_interval = interval;
        self
    }

    pub fn extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.conn.extra_headers = headers;
        self
    }

    /// Connection id used in `[ws-N]` log lines.
    pub fn connection_id(mut self, id: usize) -> Self {
        self.conn.id = id;
        self
    }

    /// Register the connection-inactive handler up front.
    pub fn on_connection_inactive<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_inactive = Some(Arc::new(handler));
        self
    }

    pub fn conn_config(&self) -> &WsConnConfig {
        &self.conn
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start the connection task and return the client.
    ///
    /// Must be called inside a tokio runtime. Subscriptions issued before the
    /// handshake completes are queued and sent once connected.
    pub fn connect(self) -> Result<StreamingClient<P>> {
        let mut connection = WsConnection::new(self.conn);
        let transport: Arc<dyn Transport> = Arc::new(connection.sender());
        let mut client =
            StreamingClient::assemble(transport, self.protocol, self.capacity, self.on_inactive)?;

        let service = client.service.clone();
        let on_text: OnMessageCallback = Arc::new(move |_conn_id, text| service.handle_text(text));
        let notifier = client.notifier.clone();
        let on_state: OnStateCallback = Arc::new(move |_conn_id, state| notifier.handle_state(state));

        info!("[{}] connecting to {}", client.service.protocol().name(), connection.config.url);
        connection.start(on_text, on_state);
        client.connection = Some(connection);
        Ok(client)
    }
}

/// Multiplexes per-channel streams over one transport.
pub struct StreamingClient<P> {
    service: Arc<StreamingService<P>>,
    cache: SubscriptionCache<P>,
    notifier: Arc<DisconnectNotifier>,
    connection: Option<WsConnection>,
}

impl<P: StreamingProtocol> StreamingClient<P> {
    pub fn builder(url: impl Into<String>, protocol: P) -> StreamingClientBuilder<P> {
        StreamingClientBuilder::new(url, protocol)
    }

    /// Client over a caller-provided transport.
    ///
    /// The caller delivers inbound frames through
    /// [`handle_text`](Self::handle_text) / [`handle_message`](Self::handle_message)
    /// and connection events through
    /// [`handle_connection_state`](Self::handle_connection_state).
    pub fn with_transport(transport: Arc<dyn Transport>, protocol: P, capacity: usize) -> Result<Self> {
        Self::assemble(transport, protocol, capacity, None)
    }

    fn assemble(
        transport: Arc<dyn Transport>,
        protocol: P,
        capacity: usize,
        on_inactive: Option<OnInactiveCallback>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(GxError::Config("channel capacity must be > 0".into()));
        }
        let message = protocol.disconnect_message();
        let notifier = match on_inactive {
            Some(handler) => DisconnectNotifier::with_handler(message, handler),
            None => DisconnectNotifier::new(message),
        };
        let service = Arc::new(StreamingService::new(protocol, transport, capacity));
        Ok(Self {
            cache: SubscriptionCache::new(service.clone()),
            service,
            notifier: Arc::new(notifier),
            connection: None,
        })
    }

    /// Live stream of `channel`; sends the subscribe frame only the first time.
    pub async fn subscribe(&self, channel: &str) -> Result<ChannelStream> {
        self.cache.subscribe(channel).await
    }

    /// Stop `channel` upstream and end its streams. Returns `false` if it was
    /// not subscribed.
    pub async fn unsubscribe(&self, channel: &str) -> Result<bool> {
        self.cache.unsubscribe(channel).await
    }

    /// Register the connection-inactive handler, replacing any previous one.
    pub fn set_connection_inactive_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.notifier.set_handler(Arc::new(handler));
    }

    /// Channels subscribed through this client, sorted.
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.cache.channels()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(WsConnection::is_running)
    }

    pub fn handle_text(&self, text: &str) {
        self.service.handle_text(text);
    }

    pub fn handle_message(&self, message: Value) -> usize {
        let message: DecodedMessage = Arc::new(message);
        self.service.handle_message(message)
    }

    pub fn handle_connection_state(&self, state: ConnectionState) {
        self.notifier.handle_state(state);
    }

    /// Close the socket. Does not invoke the inactive handler.
    pub async fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.stop().await;
            info!("[{}] disconnected", self.service.protocol().name());
        }
    }
}
