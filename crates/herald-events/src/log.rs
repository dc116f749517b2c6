//! The event log: bounded history plus live fan-out.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::EventLogConfig;
use crate::event::{Actor, Event};
use crate::filter::Filter;
use crate::history::HistoryBuffer;
use crate::pubsub::{Publisher, SubscriberId, Subscription};

/// Live feed of events handed out by [`EventLog`].
pub type EventFeed = Subscription<Arc<Event>>;

/// Records recent events and fans new ones out to subscribers.
///
/// The history and the subscriber registration share one lock, so a
/// subscriber's replay and its live feed never leave a gap. Publishing
/// happens outside that lock: an event appended just before a subscription
/// may show up both in the replay and on the feed.
///
/// Concurrent producers are serialized by a second, async lock held from the
/// append through the publish, so every feed sees events in history order.
///
/// Delivery is best effort. Each subscriber gets
/// [`EventLogConfig::publish_timeout_ms`] to accept an event; a subscriber
/// that is still full after that misses the event and is not told.
pub struct EventLog {
    publish_order: tokio::sync::Mutex<()>,
    history: Mutex<HistoryBuffer>,
    publisher: Arc<Publisher<Arc<Event>>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("history_len", &self.lock_history().len())
            .field("publisher", &self.publisher)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Create an event log with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&EventLogConfig::default())
    }

    /// Create an event log with explicit settings.
    #[must_use]
    pub fn with_config(config: &EventLogConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an event log that stamps events using `clock`.
    #[must_use]
    pub fn with_clock(config: &EventLogConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            publish_order: tokio::sync::Mutex::new(()),
            history: Mutex::new(HistoryBuffer::new(config.history_capacity)),
            publisher: Arc::new(Publisher::new(
                config.publish_timeout(),
                config.subscriber_buffer,
            )),
            clock,
        }
    }

    fn lock_history(&self) -> MutexGuard<'_, HistoryBuffer> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an event and deliver it to current subscribers.
    ///
    /// Returns once every subscriber has taken the event or timed out.
    /// Subscribers are served concurrently, so a slow one delays this call
    /// by at most one publish timeout. Concurrent calls queue behind each
    /// other and publish in the order they were appended.
    pub async fn log(
        &self,
        action: impl Into<String>,
        event_type: impl Into<String>,
        actor: Actor,
    ) {
        let order = self.publish_order.lock().await;
        let event = Event::new(action, event_type, actor, self.clock.now());

        self.lock_history().append(event.clone());

        let event = Arc::new(event);
        let delivered = self.publisher.publish(Arc::clone(&event)).await;
        drop(order);
        trace!(
            action = %event.action(),
            event_type = %event.event_type(),
            actor_id = %event.actor().id,
            delivered,
            "Event logged"
        );
    }

    /// Subscribe to all future events.
    ///
    /// Returns the full current history together with a feed that starts
    /// right after it, and a handle that ends the subscription.
    #[must_use]
    pub fn subscribe(&self) -> Subscribed {
        let history = self.lock_history();
        let replay = history.snapshot();
        let feed = self.publisher.subscribe();
        drop(history);

        debug!(subscriber = %feed.id(), replayed = replay.len(), "Subscribed to events");
        let cancel = Canceller {
            publisher: Arc::downgrade(&self.publisher),
            id: feed.id(),
        };
        Subscribed {
            history: replay,
            feed,
            cancel,
        }
    }

    /// Subscribe to future events matching `filter`, replaying buffered
    /// matches recorded at or after `(since, since_nano)`.
    ///
    /// `since_nano` uses the same unit as [`Event::time_nano`]. Pass
    /// [`NO_REPLAY`](crate::NO_REPLAY) as `since` to skip the replay. An
    /// empty filter subscribes to everything.
    #[must_use]
    pub fn subscribe_topic(
        &self,
        since: i64,
        since_nano: i64,
        filter: Filter,
    ) -> (Vec<Event>, EventFeed) {
        let history = self.lock_history();

        let (replay, feed) = if filter.is_empty() {
            let replay = history.snapshot_since(since, since_nano, None::<fn(&Event) -> bool>);
            (replay, self.publisher.subscribe())
        } else {
            let replay =
                history.snapshot_since(since, since_nano, Some(|e: &Event| filter.include(e)));
            debug!(%filter, "Subscribing with filter");
            let feed = self
                .publisher
                .subscribe_topic(move |event: &Arc<Event>| filter.include(event));
            (replay, feed)
        };
        drop(history);

        debug!(
            subscriber = %feed.id(),
            replayed = replay.len(),
            since,
            "Subscribed to events"
        );
        (replay, feed)
    }

    /// Stop delivering to a subscriber.
    ///
    /// Returns `false`, and logs a warning, if the subscriber was already
    /// evicted.
    pub fn evict(&self, id: SubscriberId) -> bool {
        self.publisher.evict(id)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscribers_count(&self) -> usize {
        self.publisher.len()
    }
}

/// Result of [`EventLog::subscribe`].
#[derive(Debug)]
pub struct Subscribed {
    /// Events recorded before the subscription, oldest first.
    pub history: Vec<Event>,
    /// Events recorded after the subscription.
    pub feed: EventFeed,
    /// Ends the subscription.
    pub cancel: Canceller,
}

/// Ends one subscription.
///
/// Consumed on use, so a subscription cannot be cancelled twice through the
/// same handle. Holds the log weakly and does nothing once it is gone.
#[derive(Debug)]
pub struct Canceller {
    publisher: Weak<Publisher<Arc<Event>>>,
    id: SubscriberId,
}

impl Canceller {
    /// Evict the subscriber. Returns whether it was still registered.
    pub fn cancel(self) -> bool {
        self.publisher
            .upgrade()
            .is_some_and(|publisher| publisher.evict(self.id))
    }
}
