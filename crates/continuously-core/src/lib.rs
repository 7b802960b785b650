//! Core types for continuously.
//!
//! This crate holds the data structures shared by the scanner and the event
//! engine: the deduplicating watch registry, the immutable run configuration
//! and the error type every fatal condition is reported through.

mod config;
mod constants;
mod error;
mod watch;

pub use config::{RunConfig, RunConfigBuilder};
pub use constants::{ENV_MARKER, ENV_MARKER_VALUE, MARKER_FILE_NAME};
pub use error::WatchError;
pub use watch::{Registrar, Watch, WatchHandle, WatchSet};
