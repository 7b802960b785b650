//! Error type for watching and running actions.
//!
//! Every variant is an invariant violation: callers propagate it to the top
//! level, where it is reported and the process terminates.

use std::path::PathBuf;

use thiserror::Error;

use crate::watch::WatchHandle;

/// Fatal conditions raised by the watch registry and the event engine.
#[derive(Debug, Error)]
pub enum WatchError {
    /// An operating system call failed.
    #[error("{operation}: {source}")]
    Os {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// An operating system call on a path failed.
    #[error("{operation}({path}): {source}")]
    Path {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A read returned fewer bytes than a whole record.
    #[error("unexpected partial read from {origin}: {got} bytes")]
    PartialRead { origin: &'static str, got: usize },

    /// A notification referenced a handle that no watch owns.
    #[error("unexpected watch descriptor: {handle}")]
    UnknownHandle { handle: WatchHandle },

    /// A child-status signal arrived while no action was running.
    #[error("unexpected child status signal: no action is running")]
    NoRunningAction,

    /// The reaped process is not the tracked action.
    #[error("reaped process {reaped:?} does not match running action {expected}")]
    PidMismatch { expected: u32, reaped: Option<u32> },

    /// The action's wait status was neither an exit nor a signal termination.
    #[error("unexpected wait status for action ({pid}): {status}")]
    UnexpectedStatus { pid: u32, status: String },

    /// Readiness was reported on a descriptor the loop did not consume.
    #[error("unhandled poll events: fd {fd}, revents {revents:#06x}")]
    UnhandledReadiness { fd: i32, revents: i16 },
}

impl WatchError {
    /// Wrap an I/O error with the name of the failed operation.
    pub fn os(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Os {
            operation: operation.into(),
            source,
        }
    }

    /// Capture `errno` for the operation that just failed.
    pub fn last_os(operation: impl Into<String>) -> Self {
        Self::os(operation, std::io::Error::last_os_error())
    }

    /// Wrap an I/O error with the operation and the path it was applied to.
    pub fn path(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Path {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }
}
