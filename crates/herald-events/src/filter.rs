//! Event filters built from `field=value` criteria.
//!
//! A [`Filter`] maps each recognized [`FilterField`] to a set of accepted
//! values. Values for the same field are alternatives; different fields must
//! all match. A filter with no entries accepts every event.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{EventsError, EventsResult};
use crate::event::{Event, IMAGE_EVENT_TYPE};

/// Fields a filter can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterField {
    /// The event action. Accepted under the names `event` and `action`.
    Event,
    /// The event type.
    Type,
    /// Image id or reference.
    Image,
    /// Container id or name.
    Container,
    /// Daemon id or name.
    Daemon,
    /// Actor attribute, as `key` or `key=value`.
    Label,
    /// Network id or name.
    Network,
    /// Volume id or name.
    Volume,
    /// Plugin id or name.
    Plugin,
}

impl FilterField {
    /// Canonical name used when displaying a filter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Type => "type",
            Self::Image => "image",
            Self::Container => "container",
            Self::Daemon => "daemon",
            Self::Label => "label",
            Self::Network => "network",
            Self::Volume => "volume",
            Self::Plugin => "plugin",
        }
    }
}

impl FromStr for FilterField {
    type Err = EventsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" | "action" => Ok(Self::Event),
            "type" => Ok(Self::Type),
            "image" => Ok(Self::Image),
            "container" => Ok(Self::Container),
            "daemon" => Ok(Self::Daemon),
            "label" => Ok(Self::Label),
            "network" => Ok(Self::Network),
            "volume" => Ok(Self::Volume),
            "plugin" => Ok(Self::Plugin),
            other => Err(EventsError::UnknownFilterField(other.to_owned())),
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values for one field in a JSON filter document.
///
/// Both `{"type": ["container"]}` and `{"type": {"container": true}}` are
/// accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValues {
    List(Vec<String>),
    Set(HashMap<String, bool>),
}

/// Predicate over events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    criteria: BTreeMap<FilterField, BTreeSet<String>>,
}

impl Filter {
    /// Create an empty filter, which accepts every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an accepted value for a field.
    #[must_use]
    pub fn with(mut self, field: FilterField, value: impl Into<String>) -> Self {
        self.criteria.entry(field).or_default().insert(value.into());
        self
    }

    /// Build a filter from `field=value` criteria.
    ///
    /// Only the first `=` separates field from value, so
    /// `label=com.example.tier=web` constrains the label
    /// `com.example.tier=web`.
    ///
    /// # Errors
    ///
    /// Returns an error if a criterion has no `=`, names an unknown field, or
    /// has an empty value.
    pub fn parse<I, S>(criteria: I) -> EventsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::new();
        for criterion in criteria {
            let criterion = criterion.as_ref();
            let Some((field, value)) = criterion.split_once('=') else {
                return Err(EventsError::InvalidFilter {
                    criterion: criterion.to_owned(),
                    reason: "expected field=value".to_owned(),
                });
            };
            filter.insert(field.trim(), value, criterion)?;
        }
        Ok(filter)
    }

    /// Build a filter from a field name → values mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if a field is unknown, has no values, or a value is
    /// empty. A field listed without values would otherwise leave that
    /// field unconstrained.
    pub fn from_criteria<K, V, I>(criteria: impl IntoIterator<Item = (K, I)>) -> EventsResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = V>,
    {
        let mut filter = Self::new();
        for (field, values) in criteria {
            let field = field.as_ref();
            let mut values = values.into_iter().peekable();
            if values.peek().is_none() {
                let parsed: FilterField = field.parse()?;
                return Err(EventsError::InvalidFilter {
                    criterion: field.to_owned(),
                    reason: format!("no values for '{parsed}'"),
                });
            }
            for value in values {
                let value = value.as_ref();
                filter.insert(field, value, &format!("{field}={value}"))?;
            }
        }
        Ok(filter)
    }

    /// Build a filter from a JSON document such as
    /// `{"type": ["container"], "label": {"tier=web": true}}`.
    ///
    /// Map-style entries set to `false` are ignored, but a field must keep
    /// at least one enabled value.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON of that shape, or
    /// if any field or value is rejected by [`Filter::from_criteria`].
    pub fn from_json(document: &str) -> EventsResult<Self> {
        let raw: HashMap<String, RawValues> = serde_json::from_str(document)?;
        let criteria = raw.into_iter().map(|(field, values)| {
            let values: Vec<String> = match values {
                RawValues::List(list) => list,
                RawValues::Set(set) => set
                    .into_iter()
                    .filter_map(|(value, enabled)| enabled.then_some(value))
                    .collect(),
            };
            (field, values)
        });
        Self::from_criteria(criteria)
    }

    fn insert(&mut self, field: &str, value: &str, criterion: &str) -> EventsResult<()> {
        let field: FilterField = field.parse()?;
        if value.is_empty() {
            return Err(EventsError::InvalidFilter {
                criterion: criterion.to_owned(),
                reason: format!("empty value for '{field}'"),
            });
        }
        self.criteria
            .entry(field)
            .or_default()
            .insert(value.to_owned());
        Ok(())
    }

    /// Accepted values for a field, if the field is constrained.
    #[must_use]
    pub fn values(&self, field: FilterField) -> Option<&BTreeSet<String>> {
        self.criteria.get(&field)
    }

    /// Whether the filter constrains nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Whether an event satisfies every constrained field.
    #[must_use]
    pub fn include(&self, event: &Event) -> bool {
        self.match_action(event)
            && self.exact(FilterField::Type, event.event_type())
            && self.match_name(FilterField::Daemon, event)
            && self.match_name(FilterField::Container, event)
            && self.match_name(FilterField::Plugin, event)
            && self.match_name(FilterField::Volume, event)
            && self.match_name(FilterField::Network, event)
            && self.match_image(event)
            && self.match_labels(event)
    }

    fn exact(&self, field: FilterField, value: &str) -> bool {
        self.criteria
            .get(&field)
            .is_none_or(|accepted| accepted.contains(value))
    }

    /// Actions such as `exec_start: sh` match the bare `exec_start`.
    fn match_action(&self, event: &Event) -> bool {
        let action = event.action();
        self.criteria.get(&FilterField::Event).is_none_or(|accepted| {
            accepted.iter().any(|value| {
                action
                    .strip_prefix(value.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
            })
        })
    }

    /// Matches the actor id or its `name` attribute; ids also match by prefix.
    fn match_name(&self, field: FilterField, event: &Event) -> bool {
        let Some(accepted) = self.criteria.get(&field) else {
            return true;
        };
        let actor = event.actor();
        let name = actor.attribute("name").unwrap_or_default();
        accepted.iter().any(|value| {
            actor.id.starts_with(value.as_str())
                || (!name.is_empty() && name.starts_with(value.as_str()))
        })
    }

    fn match_image(&self, event: &Event) -> bool {
        let Some(accepted) = self.criteria.get(&FilterField::Image) else {
            return true;
        };
        let id = event.actor().id.as_str();
        let name_attr = if event.event_type() == IMAGE_EVENT_TYPE {
            "name"
        } else {
            "image"
        };
        let name = event.actor().attribute(name_attr).unwrap_or_default();

        [id, name, strip_tag(id), strip_tag(name)]
            .into_iter()
            .filter(|candidate| !candidate.is_empty())
            .any(|candidate| accepted.contains(candidate))
    }

    fn match_labels(&self, event: &Event) -> bool {
        let Some(accepted) = self.criteria.get(&FilterField::Label) else {
            return true;
        };
        let attributes = &event.actor().attributes;
        accepted.iter().any(|label| match label.split_once('=') {
            Some((key, value)) => attributes.get(key).is_some_and(|v| v == value),
            None => attributes.contains_key(label.as_str()),
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, values) in &self.criteria {
            for value in values {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{field}={value}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Strip the tag or digest from an image reference.
///
/// Content ids (`sha256:...`) are returned unchanged, as is anything whose
/// last `:` belongs to a registry host (`localhost:5000/app`).
fn strip_tag(reference: &str) -> &str {
    if let Some((name, _digest)) = reference.split_once('@') {
        return name;
    }
    if reference.starts_with("sha256:") {
        return reference;
    }
    match reference.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => name,
        _ => reference,
    }
}
