//! Prelude module - commonly used types for convenient import.
//!
//! Use `use herald_events::prelude::*;` to import all essential types.
//!
//! # Example
//!
//! ```rust
//! use herald_events::prelude::*;
//!
//! # async fn example() {
//! let log = EventLog::new();
//! let mut subscribed = log.subscribe();
//!
//! log.log("pull", IMAGE_EVENT_TYPE, Actor::new("busybox:latest")).await;
//!
//! let event = subscribed.feed.recv().await.unwrap();
//! assert_eq!(event.status(), "pull");
//! assert!(subscribed.cancel.cancel());
//! # }
//! ```

// Event log
pub use crate::{Canceller, EventFeed, EventLog, EventLogConfig, Subscribed};

// Events
pub use crate::{Actor, CONTAINER_EVENT_TYPE, Event, IMAGE_EVENT_TYPE};

// Filtering and replay
pub use crate::{Filter, FilterField, NO_REPLAY};

// Delivery
pub use crate::{SubscriberId, Subscription};

// Errors
pub use crate::{EventsError, EventsResult};
