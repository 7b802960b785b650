//! Event loop and process control for continuously.
//!
//! This crate owns everything that touches the operating system at run time:
//!
//! - an `inotify` instance reporting modifications of watched files
//! - a `signalfd` through which interrupt, quit, terminate and child-status
//!   signals are read synchronously
//! - the interactive terminal, switched to raw mode for single-key commands
//! - the action process, of which at most one runs at a time
//!
//! [`EventLoop`] multiplexes the three descriptors with `poll(2)` on a single
//! thread and dispatches to the [`ActionRunner`] and the shutdown sequencer.
//!
//! Linux only.

pub mod console;
pub mod event_loop;
pub mod inotify;
pub mod runner;
pub mod shutdown;
pub mod signals;
pub mod terminal;

mod sys;

pub use console::{
    Console, QUIT_BANNER, WAIT_BANNER, spawn_failure_banner, status_banner, trigger_banner,
};
pub use event_loop::{EventLoop, KeyAction, classify};
pub use inotify::{Inotify, Notification, decode_notifications};
pub use runner::{ActionRunner, ExitOutcome, TriggerKind, TriggerOutcome};
pub use shutdown::{Cause, Shutdown, shutdown};
pub use signals::{Signal, SignalFd, SignalSet, decode_siginfo};
pub use terminal::TerminalController;

// Re-export core types for convenience
pub use continuously_core::{RunConfig, WatchError, WatchSet};
