//! Event log configuration.
//!
//! ```toml
//! history_capacity = 64
//! publish_timeout_ms = 100
//! subscriber_buffer = 1024
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EventsError, EventsResult};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::pubsub::{DEFAULT_PUBLISH_TIMEOUT, DEFAULT_SUBSCRIBER_BUFFER};

/// Tunables for an [`EventLog`](crate::EventLog).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventLogConfig {
    /// Number of recent events kept for replay.
    pub history_capacity: usize,
    /// How long a publish waits on each subscriber before skipping it.
    pub publish_timeout_ms: u64,
    /// Undelivered events a subscriber can hold before publishes start
    /// waiting on it.
    pub subscriber_buffer: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            publish_timeout_ms: u64::try_from(DEFAULT_PUBLISH_TIMEOUT.as_millis())
                .unwrap_or(u64::MAX),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl EventLogConfig {
    /// Set the history capacity.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the per-subscriber publish timeout.
    #[must_use]
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the per-subscriber buffer size.
    #[must_use]
    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.subscriber_buffer = buffer;
        self
    }

    /// The publish timeout as a [`Duration`].
    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Parse and validate a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML, contains unknown
    /// keys, or fails [`EventLogConfig::validate`].
    pub fn from_toml_str(document: &str) -> EventsResult<Self> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents are
    /// rejected by [`EventLogConfig::from_toml_str`].
    pub fn load_file(path: &Path) -> EventsResult<Self> {
        let document = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&document)?;
        debug!(path = %path.display(), "Loaded event log config");
        Ok(config)
    }

    /// Reject values the event log cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::Config`] if any value is zero.
    pub fn validate(&self) -> EventsResult<()> {
        if self.history_capacity == 0 {
            return Err(EventsError::Config(
                "history_capacity must be at least 1".to_owned(),
            ));
        }
        if self.publish_timeout_ms == 0 {
            return Err(EventsError::Config(
                "publish_timeout_ms must be at least 1".to_owned(),
            ));
        }
        if self.subscriber_buffer == 0 {
            return Err(EventsError::Config(
                "subscriber_buffer must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
