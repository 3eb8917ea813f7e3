//! Per-channel fan-out streams.
//!
//! Each subscribed channel owns one [`ChannelSender`] backed by a
//! `tokio::sync::broadcast` queue. Every consumer gets its own
//! [`ChannelStream`] receiver on that queue, so all consumers of a channel
//! observe the same message sequence. Publishing never blocks: a consumer that
//! falls more than `capacity` messages behind skips ahead and logs the gap.
//!
//! The stream ends once every sender clone is dropped, which happens when the
//! channel is unsubscribed or the client is torn down.

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

/// An already-parsed inbound message, shared by every consumer of a channel.
pub type DecodedMessage = Arc<serde_json::Value>;

/// Publishing side of one channel.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    channel: Arc<str>,
    tx: broadcast::Sender<DecodedMessage>,
}

impl ChannelSender {
    /// `capacity` must be non-zero.
    pub fn new(channel: &str, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { channel: Arc::from(channel), tx }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish `message` to all current consumers. Returns how many consumers
    /// it was queued for; zero is not an error.
    pub fn publish(&self, message: DecodedMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    /// A new consumer, starting at the next published message.
    pub fn stream(&self) -> ChannelStream {
        ChannelStream { channel: self.channel.clone(), rx: self.tx.subscribe() }
    }

    pub fn consumer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One consumer's view of a channel.
#[derive(Debug)]
pub struct ChannelStream {
    channel: Arc<str>,
    rx: broadcast::Receiver<DecodedMessage>,
}

impl ChannelStream {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next message, or `None` once the channel has been closed.
    pub async fn recv(&mut self) -> Option<DecodedMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[{}] consumer lagged, skipped {skipped} message(s)", self.channel);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<DecodedMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Some(msg),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("[{}] consumer lagged, skipped {skipped} message(s)", self.channel);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Adapt into a `futures` [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = DecodedMessage> + Send + 'static {
        futures_util::stream::unfold(self, |mut s| async move {
            let msg = s.recv().await?;
            Some((msg, s))
        })
    }
}

impl Clone for ChannelStream {
    /// Another consumer of the same channel, starting at the next message.
    fn clone(&self) -> Self {
        Self { channel: self.channel.clone(), rx: self.rx.resubscribe() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;

    fn msg(price: &str) -> DecodedMessage {
        Arc::new(json!({"product_id": "BTC-USD", "price": price}))
    }

    #[test]
    fn all_consumers_see_the_same_sequence() {
        let sender = ChannelSender::new("BTC-USD", 16);
        let mut a = sender.stream();
        let mut b = a.clone();
        assert_eq!(sender.consumer_count(), 2);

        assert_eq!(sender.publish(msg("1")), 2);
        assert_eq!(sender.publish(msg("2")), 2);

        for s in [&mut a, &mut b] {
            assert_eq!(s.try_recv().unwrap()["price"], "1");
            assert_eq!(s.try_recv().unwrap()["price"], "2");
            assert!(s.try_recv().is_none());
        }
    }

    #[test]
    fn publish_without_consumers_is_fine() {
        let sender = ChannelSender::new("BTC-USD", 4);
        assert_eq!(sender.publish(msg("1")), 0);
        let mut late = sender.stream();
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn lagging_consumer_skips_ahead() {
        let sender = ChannelSender::new("BTC-USD", 2);
        let mut s = sender.stream();
        for p in ["1", "2", "3", "4"] {
            sender.publish(msg(p));
        }
        assert_eq!(s.try_recv().unwrap()["price"], "3");
        assert_eq!(s.try_recv().unwrap()["price"], "4");
    }

    #[tokio::test]
    async fn stream_ends_when_sender_dropped() {
        let sender = ChannelSender::new("ETH-USD", 4);
        let stream = sender.stream();
        assert_eq!(stream.channel(), "ETH-USD");
        sender.publish(msg("1"));
        drop(sender);

        let items: Vec<_> = stream.into_stream().collect().await;
        assert_eq!(items.len(), 1);
    }
}
