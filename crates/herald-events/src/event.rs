//! Event types recorded by the event log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events about containers.
pub const CONTAINER_EVENT_TYPE: &str = "container";
/// Events about images.
pub const IMAGE_EVENT_TYPE: &str = "image";
/// Events about volumes.
pub const VOLUME_EVENT_TYPE: &str = "volume";
/// Events about networks.
pub const NETWORK_EVENT_TYPE: &str = "network";
/// Events about the daemon itself.
pub const DAEMON_EVENT_TYPE: &str = "daemon";
/// Events about plugins.
pub const PLUGIN_EVENT_TYPE: &str = "plugin";

/// The subject of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identifier of the resource.
    #[serde(rename = "ID")]
    pub id: String,
    /// Free-form metadata (name, image, labels...).
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
}

impl Actor {
    /// Create an actor with no attributes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A single recorded event.
///
/// Events are immutable: every field is fixed by [`Event::new`] and only
/// exposed through accessors. The `status`, `id` and `from` fields exist for
/// consumers of the older flat format and are derived from the actor for
/// container and image events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    from: String,

    #[serde(rename = "Type")]
    event_type: String,
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Actor")]
    actor: Actor,

    time: i64,
    #[serde(rename = "timeNano")]
    time_nano: i64,
}

impl Event {
    /// Build an event stamped with `at`.
    ///
    /// `time` is `at` truncated to whole seconds and `time_nano` is the full
    /// nanosecond timestamp, so both always describe the same instant.
    #[must_use]
    pub fn new(
        action: impl Into<String>,
        event_type: impl Into<String>,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Self {
        let action = action.into();
        let event_type = event_type.into();

        let (id, status, from) = match event_type.as_str() {
            CONTAINER_EVENT_TYPE => (
                actor.id.clone(),
                action.clone(),
                actor.attribute("image").unwrap_or_default().to_owned(),
            ),
            IMAGE_EVENT_TYPE => (actor.id.clone(), action.clone(), String::new()),
            _ => (String::new(), String::new(), String::new()),
        };

        Self {
            status,
            id,
            from,
            event_type,
            action,
            actor,
            time: at.timestamp(),
            // Out of range only after the year 2262.
            time_nano: at.timestamp_nanos_opt().unwrap_or(i64::MAX),
        }
    }

    /// What happened (`create`, `die`, `exec_start: sh`...).
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Subject category (`container`, `image`...).
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The subject of the event.
    #[must_use]
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Seconds since the Unix epoch.
    #[must_use]
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Nanoseconds since the Unix epoch.
    #[must_use]
    pub fn time_nano(&self) -> i64 {
        self.time_nano
    }

    /// Legacy status field (the action, for container and image events).
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Legacy id field (the actor id, for container and image events).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Legacy from field (the image a container was created from).
    #[must_use]
    pub fn from_image(&self) -> &str {
        &self.from
    }

    /// Whether this event happened before the `(since, since_nano)` cutoff.
    #[must_use]
    pub fn is_before(&self, since: i64, since_nano: i64) -> bool {
        self.time < since || (self.time == since && self.time_nano < since_nano)
    }
}
