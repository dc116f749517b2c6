//! Herald Events - bounded event history with live, filtered fan-out.
//!
//! This crate provides:
//! - [`Event`] records describing what happened to a managed resource
//! - A fixed-capacity [`HistoryBuffer`] of recent events
//! - [`Filter`]s built from `field=value` criteria
//! - A generic [`Publisher`] that delivers to every subscriber with a bounded
//!   wait per subscriber
//! - The [`EventLog`] facade tying them together
//!
//! # Architecture
//!
//! Producers call [`EventLog::log`], which appends the event to the history
//! and then offers it to every subscriber. Consumers call
//! [`EventLog::subscribe`] or [`EventLog::subscribe_topic`] to get a replay of
//! recent history plus a live feed that continues where the replay ends.
//!
//! Delivery favours liveness: a subscriber that does not accept an event
//! within the publish timeout (100ms by default) misses it.
//!
//! # Example
//!
//! ```rust
//! use herald_events::{Actor, EventLog, Filter, NO_REPLAY};
//!
//! # async fn example() {
//! let log = EventLog::new();
//!
//! let filter = Filter::parse(["type=container", "event=die"]).unwrap();
//! let (_replay, mut feed) = log.subscribe_topic(NO_REPLAY, 0, filter);
//!
//! log.log("die", "container", Actor::new("4fa6e0f0c678")).await;
//!
//! let event = feed.recv().await.unwrap();
//! assert_eq!(event.action(), "die");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod clock;
mod config;
mod error;
mod event;
mod filter;
mod history;
mod log;
mod pubsub;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EventLogConfig;
pub use error::{EventsError, EventsResult};
pub use event::{
    Actor, CONTAINER_EVENT_TYPE, DAEMON_EVENT_TYPE, Event, IMAGE_EVENT_TYPE, NETWORK_EVENT_TYPE,
    PLUGIN_EVENT_TYPE, VOLUME_EVENT_TYPE,
};
pub use filter::{Filter, FilterField};
pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryBuffer, NO_REPLAY};
pub use log::{Canceller, EventFeed, EventLog, Subscribed};
pub use pubsub::{
    DEFAULT_PUBLISH_TIMEOUT, DEFAULT_SUBSCRIBER_BUFFER, Predicate, Publisher, SubscriberId,
    Subscription,
};
