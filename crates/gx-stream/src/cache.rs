//! Subscription cache: one upstream subscribe per channel.
//!
//! Many consumers may ask for the same product. The first request sends the
//! subscribe frame and stores the channel's sender; every later request only
//! gets a new consumer on the stored channel. The lookup-or-create path runs
//! under an async gate so two racing callers for a new channel cannot both
//! send a frame, while the hit path takes just a shared read lock.
//!
//! Entries live until [`SubscriptionCache::unsubscribe`] removes them; there is
//! no eviction when the last consumer goes away.

use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use gx_core::error::{GxError, Result};
use tokio::sync::Mutex;
use tracing::info;

use crate::channel::{ChannelSender, ChannelStream};
use crate::protocol::StreamingProtocol;
use crate::service::StreamingService;

pub struct SubscriptionCache<P> {
    service: Arc<StreamingService<P>>,
    entries: RwLock<AHashMap<String, ChannelSender>>,
    gate: Mutex<()>,
}

impl<P: StreamingProtocol> SubscriptionCache<P> {
    pub fn new(service: Arc<StreamingService<P>>) -> Self {
        Self { service, entries: RwLock::new(AHashMap::new()), gate: Mutex::new(()) }
    }

    /// Stream of `channel`, subscribing upstream only if nobody has yet.
    ///
    /// A channel already registered directly on the service is adopted
    /// without sending another frame. Errors from building or sending the
    /// frame are returned and leave no entry behind, so a retry subscribes
    /// again.
    pub async fn subscribe(&self, channel: &str) -> Result<ChannelStream> {
        if channel.trim().is_empty() {
            return Err(GxError::InvalidChannel(channel.to_string()));
        }
        if let Some(sender) = self.lookup(channel) {
            return Ok(sender.stream());
        }

        let _guard = self.gate.lock().await;
        if let Some(sender) = self.lookup(channel) {
            return Ok(sender.stream());
        }

        if let Some(sender) = self.service.channel(channel) {
            let stream = sender.stream();
            self.entries.write().unwrap().insert(channel.to_string(), sender);
            return Ok(stream);
        }

        let (sender, stream) = self.service.subscribe_channel(channel).await?;
        self.entries.write().unwrap().insert(channel.to_string(), sender);
        info!("[{}] {channel} subscribed", self.service.protocol().name());
        Ok(stream)
    }

    /// Unsubscribe `channel` upstream and forget it.
    ///
    /// Consumer streams of the channel end. Returns `false` if the channel was
    /// not subscribed through this cache. A later [`subscribe`](Self::subscribe)
    /// sends a new subscribe frame.
    pub async fn unsubscribe(&self, channel: &str) -> Result<bool> {
        let _guard = self.gate.lock().await;
        if self.lookup(channel).is_none() {
            return Ok(false);
        }
        self.service.unsubscribe_channel(channel).await?;
        self.entries.write().unwrap().remove(channel);
        info!("[{}] {channel} unsubscribed", self.service.protocol().name());
        Ok(true)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.entries.read().unwrap().contains_key(channel)
    }

    /// Cached channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, channel: &str) -> Option<ChannelSender> {
        self.entries.read().unwrap().get(channel).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdax::GdaxProtocol;
    use crate::test_util::RecordingTransport;
    use serde_json::json;

    const BTC_SUB: &str = r#"{"type":"subscribe","product_id":"BTC-USD"}"#;

    fn cache() -> (Arc<RecordingTransport>, Arc<StreamingService<GdaxProtocol>>, SubscriptionCache<GdaxProtocol>) {
        let transport = Arc::new(RecordingTransport::default());
        let service = Arc::new(StreamingService::new(GdaxProtocol, transport.clone(), 16));
        let cache = SubscriptionCache::new(service.clone());
        (transport, service, cache)
    }

    #[tokio::test]
    async fn sequential_subscribe_sends_one_frame() {
        let (transport, service, cache) = cache();
        let mut a = cache.subscribe("BTC-USD").await.unwrap();
        let mut b = cache.subscribe("BTC-USD").await.unwrap();

        assert_eq!(transport.frames(), vec![BTC_SUB]);
        assert_eq!(cache.len(), 1);

        service.handle_message(Arc::new(json!({"product_id": "BTC-USD", "seq": 1})));
        assert_eq!(a.try_recv().unwrap()["seq"], 1);
        assert_eq!(b.try_recv().unwrap()["seq"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_subscribe_sends_one_frame() {
        let (transport, service, cache) = cache();
        let cache = Arc::new(cache);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.subscribe("BTC-USD").await.unwrap() })
            })
            .collect();
        let mut streams = Vec::new();
        for t in tasks {
            streams.push(t.await.unwrap());
        }

        assert_eq!(transport.count_of(BTC_SUB), 1);
        assert_eq!(service.handle_message(Arc::new(json!({"product_id": "BTC-USD", "seq": 7}))), 16);
        for s in &mut streams {
            assert_eq!(s.try_recv().unwrap()["seq"], 7);
        }
    }

    #[tokio::test]
    async fn failed_subscribe_records_nothing_and_can_retry() {
        let (transport, _service, cache) = cache();
        transport.set_failing(true);
        assert!(matches!(cache.subscribe("BTC-USD").await, Err(GxError::Transmission(_))));
        assert!(!cache.contains("BTC-USD"));

        transport.set_failing(false);
        cache.subscribe("BTC-USD").await.unwrap();
        assert_eq!(transport.count_of(BTC_SUB), 1);
        assert!(cache.contains("BTC-USD"));
    }

    #[tokio::test]
    async fn empty_channel_is_rejected() {
        let (transport, _service, cache) = cache();
        assert!(matches!(cache.subscribe("").await, Err(GxError::InvalidChannel(_))));
        assert!(matches!(cache.subscribe("  ").await, Err(GxError::InvalidChannel(_))));
        assert!(transport.frames().is_empty());
    }

    #[tokio::test]
    async fn adopts_channel_registered_on_service() {
        let (transport, service, cache) = cache();
        service.subscribe_channel("BTC-USD").await.unwrap();

        let mut s = cache.subscribe("BTC-USD").await.unwrap();
        assert_eq!(transport.count_of(BTC_SUB), 1);
        service.handle_message(Arc::new(json!({"product_id": "BTC-USD"})));
        assert!(s.try_recv().is_some());
    }

    #[tokio::test]
    async fn unsubscribe_evicts_and_closes_streams() {
        let (transport, service, cache) = cache();
        let mut s = cache.subscribe("BTC-USD").await.unwrap();

        assert!(cache.unsubscribe("BTC-USD").await.unwrap());
        assert!(!cache.unsubscribe("BTC-USD").await.unwrap());
        assert!(cache.is_empty());
        assert!(!service.is_channel_active("BTC-USD"));
        assert!(s.recv().await.is_none());

        // Residual message after unsubscribe is dropped.
        assert_eq!(service.handle_message(Arc::new(json!({"product_id": "BTC-USD"}))), 0);

        cache.subscribe("BTC-USD").await.unwrap();
        assert_eq!(transport.count_of(BTC_SUB), 2);
        assert_eq!(
            transport.count_of(r#"{"type":"unsubscribe","product_id":"BTC-USD"}"#),
            1
        );
    }

    #[tokio::test]
    async fn channels_are_sorted() {
        let (_transport, _service, cache) = cache();
        cache.subscribe("ETH-USD").await.unwrap();
        cache.subscribe("BTC-USD").await.unwrap();
        assert_eq!(cache.channels(), vec!["BTC-USD", "ETH-USD"]);
    }
}
