//! Orderly exit of the watcher.

use std::fmt;

use continuously_core::WatchError;
use tracing::info;

use crate::console::Console;
use crate::runner::ActionRunner;
use crate::signals::Signal;
use crate::terminal::TerminalController;

/// Why the watcher is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// A termination signal was received.
    Signal(Signal),
    /// A cancel key was typed on the terminal.
    Key(u8),
}

impl Cause {
    /// Signal forwarded to a running action.
    ///
    /// A cancel key behaves like an interrupt.
    pub fn child_signal(self) -> Signal {
        match self {
            Self::Signal(signal) => signal,
            Self::Key(_) => Signal::INTERRUPT,
        }
    }

    /// Short description for the exit log line.
    pub fn reason(self) -> String {
        match self {
            Self::Signal(signal) => signal.name(),
            Self::Key(byte) => format!("key {}", char::from(byte).escape_default()),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

/// How the watcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown {
    pub cause: Cause,
    /// Pid of the action that was signalled on the way out.
    pub forwarded: Option<u32>,
}

/// Print the quit banner, forward the cause to a running action and put
/// the terminal back.
///
/// The action is not waited for.
pub fn shutdown(
    cause: Cause,
    runner: &mut ActionRunner,
    terminal: &mut TerminalController,
    console: &mut Console,
) -> Result<Shutdown, WatchError> {
    info!("shutting down: {cause}");
    console.quitting()?;

    let forwarded = runner.signal(cause.child_signal())?;
    terminal.restore()?;

    Ok(Shutdown { cause, forwarded })
}
