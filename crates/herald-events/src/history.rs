//! Fixed-capacity history of recent events.

use std::collections::VecDeque;

use crate::event::Event;

/// Default number of events kept for replay.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// `since` value that requests no replay at all.
pub const NO_REPLAY: i64 = -1;

/// Ordered store of the most recent events.
///
/// Insertion order is chronological order. Once full, every append discards
/// the oldest event. The buffer has no locking of its own; the event log
/// guards it.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    events: VecDeque<Event>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest one when full.
    pub fn append(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Copy of every buffered event, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Copy of the buffered events at or after `(since, since_nano)` that
    /// satisfy `predicate`, oldest first.
    ///
    /// `since_nano` is in nanoseconds since the epoch, like
    /// [`Event::time_nano`]. The scan walks back from the newest event and
    /// stops at the first one older than the cutoff. [`NO_REPLAY`] returns
    /// nothing.
    #[must_use]
    pub fn snapshot_since<P>(&self, since: i64, since_nano: i64, predicate: Option<P>) -> Vec<Event>
    where
        P: Fn(&Event) -> bool,
    {
        if since == NO_REPLAY {
            return Vec::new();
        }

        let mut replay: Vec<Event> = self
            .events
            .iter()
            .rev()
            .take_while(|event| !event.is_before(since, since_nano))
            .filter(|event| predicate.as_ref().is_none_or(|p| p(event)))
            .cloned()
            .collect();
        replay.reverse();
        replay
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of buffered events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
