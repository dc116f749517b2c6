//! Error types for the event log.

use thiserror::Error;

/// Errors raised while building filters or loading configuration.
///
/// Logging and delivery never fail; a subscriber that cannot keep up is
/// skipped rather than reported.
#[derive(Debug, Error)]
pub enum EventsError {
    /// A filter criterion could not be split into a field and a value.
    #[error("invalid filter criterion '{criterion}': {reason}")]
    InvalidFilter {
        /// The criterion as supplied by the caller.
        criterion: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A filter criterion named a field the log does not know about.
    #[error("unknown filter field '{0}'")]
    UnknownFilterField(String),

    /// A JSON filter document could not be decoded.
    #[error("invalid filter document: {0}")]
    InvalidFilterJson(#[from] serde_json::Error),

    /// Configuration values were rejected.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file was not valid TOML.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for event log operations.
pub type EventsResult<T> = Result<T, EventsError>;
