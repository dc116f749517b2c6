//! Fan-out to many subscribers with a bounded wait per subscriber.
//!
//! Every subscriber owns a bounded channel. [`Publisher::publish`] offers the
//! value to all matching subscribers concurrently; a subscriber whose channel
//! stays full for longer than the publish timeout is skipped for that value.
//! Slow consumers therefore lose values instead of stalling producers or
//! each other.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Default time a publish waits on each subscriber.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);

/// Default number of undelivered values a subscriber can hold.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1024;

/// Topic predicate deciding whether a subscriber wants a value.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Identifies one subscriber of a [`Publisher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

struct Topic<T> {
    sender: mpsc::Sender<T>,
    predicate: Option<Predicate<T>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

/// Multi-consumer publisher with timeout-bounded delivery.
pub struct Publisher<T> {
    subscribers: DashMap<SubscriberId, Topic<T>>,
    timeout: Duration,
    buffer: usize,
}

impl<T> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("subscriber_count", &self.subscribers.len())
            .field("timeout", &self.timeout)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<T> Publisher<T>
where
    T: Clone + Send + 'static,
{
    /// Create a publisher. A buffer of zero is raised to one.
    #[must_use]
    pub fn new(timeout: Duration, buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            timeout,
            buffer: buffer.max(1),
        }
    }

    /// Subscribe to every value published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        self.register(None)
    }

    /// Subscribe to values accepted by `predicate`.
    #[must_use]
    pub fn subscribe_topic<F>(&self, predicate: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.register(Some(Arc::new(predicate)))
    }

    fn register(&self, predicate: Option<Predicate<T>>) -> Subscription<T> {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = SubscriberId::new();
        let filtered = predicate.is_some();

        self.subscribers.insert(id, Topic { sender, predicate });
        debug!(subscriber = %id, filtered, "Subscriber registered");

        Subscription { id, receiver }
    }

    /// Remove a subscriber.
    ///
    /// Values already being delivered to it may still arrive; nothing new is
    /// sent afterwards and its feed closes once those finish. Returns `false`
    /// if the subscriber was not registered.
    pub fn evict(&self, id: SubscriberId) -> bool {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber = %id, "Subscriber evicted");
            true
        } else {
            warn!(subscriber = %id, "Evict of unknown subscriber");
            false
        }
    }

    /// Offer `value` to every matching subscriber.
    ///
    /// Deliveries run concurrently, so the call returns within roughly one
    /// publish timeout however many subscribers are slow. A subscriber that
    /// cannot accept the value in time misses it. Returns the number of
    /// subscribers that received the value.
    pub async fn publish(&self, value: T) -> usize {
        // Predicates run outside the map's shard locks.
        let topics: Vec<(SubscriberId, Topic<T>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let timeout = self.timeout;
        let deliveries = topics
            .into_iter()
            .filter(|(_, topic)| topic.predicate.as_ref().is_none_or(|p| p(&value)))
            .map(|(id, topic)| {
                let value = value.clone();
                async move {
                    match topic.sender.send_timeout(value, timeout).await {
                        Ok(()) => true,
                        Err(SendTimeoutError::Timeout(_)) => {
                            debug!(
                                subscriber = %id,
                                ?timeout,
                                "Subscriber too slow, value skipped"
                            );
                            false
                        },
                        Err(SendTimeoutError::Closed(_)) => {
                            warn!(subscriber = %id, "Subscriber feed dropped, value skipped");
                            false
                        },
                    }
                }
            });

        let delivered = join_all(deliveries)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count();
        trace!(delivered, "Value published");
        delivered
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Time a publish waits on each subscriber.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<T> Default for Publisher<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_PUBLISH_TIMEOUT, DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// Receiving end of one subscription.
///
/// Dropping a subscription does not unregister it; publishes skip it
/// immediately until it is evicted.
pub struct Subscription<T> {
    id: SubscriberId,
    receiver: mpsc::Receiver<T>,
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<T> Subscription<T> {
    /// Identifier to pass to [`Publisher::evict`].
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next value.
    ///
    /// Returns `None` once the subscriber has been evicted and every pending
    /// value has been drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Receive a value if one is ready.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let publisher = Publisher::default();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        assert_eq!(publisher.publish(7_u32).await, 2);

        assert_eq!(first.recv().await, Some(7));
        assert_eq!(second.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let publisher: Publisher<u32> = Publisher::default();
        assert!(publisher.is_empty());
        assert_eq!(publisher.publish(1).await, 0);
    }

    #[tokio::test]
    async fn test_topic_subscription_filters_values() {
        let publisher = Publisher::default();
        let mut evens = publisher.subscribe_topic(|v: &u32| v % 2 == 0);

        assert_eq!(publisher.publish(1).await, 0);
        assert_eq!(publisher.publish(2).await, 1);

        assert_eq!(evens.recv().await, Some(2));
        assert!(evens.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_values_arrive_in_publish_order() {
        let publisher = Publisher::default();
        let mut sub = publisher.subscribe();

        for v in 0..10_u32 {
            publisher.publish(v).await;
        }
        for v in 0..10_u32 {
            assert_eq!(sub.recv().await, Some(v));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_skipped_after_timeout() {
        let publisher = Publisher::new(Duration::from_millis(20), 1);
        let mut stalled = publisher.subscribe();
        let mut healthy = publisher.subscribe();

        assert_eq!(publisher.publish(1_u32).await, 2);
        assert_eq!(healthy.recv().await, Some(1));

        // `stalled` still holds 1, so its single slot is full.
        let started = Instant::now();
        assert_eq!(publisher.publish(2).await, 1);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(healthy.recv().await, Some(2));
        assert_eq!(stalled.recv().await, Some(1));
        assert!(stalled.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_evict_closes_feed() {
        let publisher = Publisher::default();
        let mut sub = publisher.subscribe();
        assert_eq!(publisher.len(), 1);

        publisher.publish(1_u32).await;
        assert!(publisher.evict(sub.id()));
        assert_eq!(publisher.len(), 0);

        assert_eq!(publisher.publish(2).await, 0);
        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_second_evict_is_reported() {
        let publisher: Publisher<u32> = Publisher::default();
        let sub = publisher.subscribe();
        let _other = publisher.subscribe();

        assert!(publisher.evict(sub.id()));
        assert!(!publisher.evict(sub.id()));
        assert_eq!(publisher.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_skipped() {
        let publisher = Publisher::new(Duration::from_secs(5), 1);
        let sub = publisher.subscribe();
        drop(sub);

        let started = Instant::now();
        assert_eq!(publisher.publish(1_u32).await, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(publisher.len(), 1);
    }
}
