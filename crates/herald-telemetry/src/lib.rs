//! Herald Telemetry - logging setup for processes embedding the event log.
//!
//! The event log itself only emits `tracing` events. This crate installs a
//! global subscriber for them with a configurable level, format and target.
//!
//! # Example
//!
//! ```rust,no_run
//! use herald_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), herald_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("herald_events=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
