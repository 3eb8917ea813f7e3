//! Single WebSocket connection used as the streaming transport.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the venue endpoint (TLS), retrying with exponential backoff
//!    until the first successful handshake.
//! 2. Reports [`ConnectionState::Active`] and flushes any frames queued
//!    before the socket was open.
//! 3. Reads text frames and forwards them to a callback.
//! 4. Sends periodic WebSocket pings when configured.
//! 5. Reports [`ConnectionState::Inactive`] when the venue closes the socket or
//!    a read/write fails, then exits.
//!
//! The task never reconnects by itself once it has been connected: channel
//! subscriptions live above the transport, so re-establishing them is left to
//! whoever observes the inactive event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use super::{ConnectionState, Transport};
use crate::error::{GxError, Result};

/// Callback invoked for each received text frame.
///
/// Parameters: `(connection_id, message_text)`
pub type OnMessageCallback = Arc<dyn Fn(usize, &str) + Send + Sync>;

/// Callback invoked on connection-state transitions.
///
/// Parameters: `(connection_id, new_state)`
pub type OnStateCallback = Arc<dyn Fn(usize, ConnectionState) + Send + Sync>;

const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://ws-feed.exchange.coinbase.com`).
    pub url: String,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Interval between WebSocket ping frames. `None` or zero disables pings.
    pub ping_interval: Option<Duration>,
    /// Connection identifier, used as the `[ws-N]` log prefix.
    pub id: usize,
    /// Outbound frames that may be queued while the socket is busy or not yet
    /// open.
    pub outbound_capacity: usize,
}

impl WsConnConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra_headers: HashMap::new(),
            ping_interval: None,
            id: 0,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Cloneable handle that queues text frames on a [`WsConnection`].
#[derive(Debug, Clone)]
pub struct WsSender {
    id: usize,
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl Transport for WsSender {
    async fn send_text(&self, frame: String) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                GxError::Transmission(format!("[ws-{}] outbound queue full", self.id))
            }
            mpsc::error::TrySendError::Closed(_) => {
                GxError::Transmission(format!("[ws-{}] connection closed", self.id))
            }
        })
    }
}

/// A single WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    outbound_tx: mpsc::Sender<String>,
    /// Taken by the connection task on start.
    outbound_rx: Option<mpsc::Receiver<String>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    ///
    /// The outbound queue exists from here on, so [`sender`](Self::sender)
    /// can be handed out before [`start`](Self::start).
    pub fn new(config: WsConnConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(config.outbound_capacity.max(1));
        Self {
            config,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Handle for queueing outbound text frames.
    pub fn sender(&self) -> WsSender {
        WsSender { id: self.config.id, tx: self.outbound_tx.clone() }
    }

    /// Start the connection task.
    ///
    /// Text frames are forwarded to `on_text`; state transitions to `on_state`.
    /// Calling `start` a second time is a no-op.
    pub fn start(&mut self, on_text: OnMessageCallback, on_state: OnStateCallback) {
        let Some(outbound_rx) = self.outbound_rx.take() else {
            warn!("[ws-{}] already started", self.config.id);
            return;
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            connection_loop(config, on_text, on_state, outbound_rx, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
    }

    /// Whether the connection task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the connection and wait for the task to finish.
    ///
    /// A requested shutdown does not report [`ConnectionState::Inactive`].
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        // Never started: close the queue so pending senders fail fast.
        self.outbound_rx.take();
    }
}

/// Main connection loop: connect, flush, read, ping, report disconnect.
async fn connection_loop(
    config: WsConnConfig,
    on_text: OnMessageCallback,
    on_state: OnStateCallback,
    mut outbound_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);
    let conn_id = config.id;

    let ws_stream = loop {
        if *shutdown_rx.borrow() {
            info!("[ws-{conn_id}] shutdown requested");
            return;
        }

        info!("[ws-{conn_id}] connecting to {}", config.url);

        match connect_ws(&config).await {
            Ok(s) => break s,
            Err(e) => {
                error!("[ws-{conn_id}] connection failed: {e}, retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return,
                }
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    };

    info!("[ws-{conn_id}] connected");
    on_state(conn_id, ConnectionState::Active);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    let mut ping = config.ping_interval.filter(|p| !p.is_zero()).map(|period| {
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("[ws-{conn_id}] shutdown signal received");
                let _ = ws_write.close().await;
                return;
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        on_text(conn_id, &text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_write.send(Message::Pong(data)).await {
                            error!("[ws-{conn_id}] pong send error: {e}");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!("[ws-{conn_id}] received close frame: {frame:?}");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("[ws-{conn_id}] read error: {e}");
                        break;
                    }
                    None => {
                        warn!("[ws-{conn_id}] stream ended");
                        break;
                    }
                    Some(Ok(other)) => {
                        trace!("[ws-{conn_id}] ignoring frame: {other:?}");
                    }
                }
            }

            Some(frame) = outbound_rx.recv() => {
                debug!("[ws-{conn_id}] sending: {frame}");
                if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                    error!("[ws-{conn_id}] send error: {e}");
                    break;
                }
            }

            _ = next_ping(&mut ping) => {
                if let Err(e) = ws_write.send(Message::Ping(vec![].into())).await {
                    error!("[ws-{conn_id}] ping send error: {e}");
                    break;
                }
            }
        }
    }

    // Close the queue before reporting, so senders observing the event see a
    // closed transport.
    discard_pending(conn_id, &mut outbound_rx);
    warn!("[ws-{conn_id}] disconnected");
    on_state(conn_id, ConnectionState::Inactive);
}

/// Close the outbound queue and drop whatever was accepted but never written.
fn discard_pending(conn_id: usize, outbound_rx: &mut mpsc::Receiver<String>) -> usize {
    outbound_rx.close();
    let mut dropped = 0;
    while let Ok(frame) = outbound_rx.try_recv() {
        warn!("[ws-{conn_id}] dropping unsent frame: {frame}");
        dropped += 1;
    }
    dropped
}

/// Resolves on the next ping tick, or never when pings are disabled.
async fn next_ping(ping: &mut Option<tokio::time::Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Establish a (possibly TLS) WebSocket connection.
async fn connect_ws(
    config: &WsConnConfig,
) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>>
{
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| GxError::WebSocket(format!("invalid url {}: {e}", config.url)))?;
    for (key, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| GxError::WebSocket(format!("invalid header name {key:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| GxError::WebSocket(format!("invalid header value for {key:?}: {e}")))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| GxError::WebSocket(e.to_string()))?;
    debug!("[ws-{}] handshake to {} status={}", config.id, extract_host(&config.url), response.status());
    Ok(stream)
}

/// Extract the host from a URL string.
fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("").to_string())
        .unwrap_or_default()
}
