//! Status banners on standard output.

use std::ffi::CStr;
use std::io::Write;
use std::os::fd::RawFd;

use continuously_core::WatchError;

use crate::runner::{ExitOutcome, TriggerKind};
use crate::sys;

/// Banner shown while waiting for the next trigger.
pub const WAIT_BANNER: &str = "[wait] ";

/// Banner shown when the watcher quits.
pub const QUIT_BANNER: &str = "[quit]\n";

/// Writes state transitions for a human watching the terminal.
///
/// Everything is suppressed in quiet mode.
pub struct Console {
    out: Box<dyn Write>,
    quiet: bool,
    drain_fd: Option<RawFd>,
}

impl Console {
    /// Console writing to `out`.
    pub fn new(out: impl Write + 'static, quiet: bool) -> Self {
        Self {
            out: Box::new(out),
            quiet,
            drain_fd: None,
        }
    }

    /// Console on standard output, drained after prompts when it is a terminal.
    pub fn stdout(quiet: bool, is_terminal: bool) -> Self {
        Self {
            out: Box::new(std::io::stdout()),
            quiet,
            drain_fd: is_terminal.then_some(libc::STDOUT_FILENO),
        }
    }

    /// Whether banners are suppressed.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Prompt that the watcher is idle.
    pub fn waiting(&mut self) -> Result<(), WatchError> {
        self.emit(WAIT_BANNER, true)
    }

    /// Announce a newly started action.
    pub fn triggered(&mut self, kind: TriggerKind) -> Result<(), WatchError> {
        self.emit(&trigger_banner(kind), false)
    }

    /// Report how the last action ended, then prompt again.
    pub fn finished(&mut self, outcome: &ExitOutcome) -> Result<(), WatchError> {
        self.emit(&status_banner(outcome), true)
    }

    /// Report an action that could not be started, then prompt again.
    pub fn spawn_failed(&mut self, errno: i32) -> Result<(), WatchError> {
        self.emit(&spawn_failure_banner(errno), true)
    }

    /// Final marker before the watcher exits.
    pub fn quitting(&mut self) -> Result<(), WatchError> {
        self.emit(QUIT_BANNER, false)
    }

    fn emit(&mut self, text: &str, drain: bool) -> Result<(), WatchError> {
        if self.quiet {
            return Ok(());
        }

        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| WatchError::os("write(stdout)", e))?;

        if let (true, Some(fd)) = (drain, self.drain_fd) {
            sys::drain(fd)?;
        }
        Ok(())
    }
}

/// `[file trigger]` or `[manual trigger]`, with a newline.
pub fn trigger_banner(kind: TriggerKind) -> String {
    format!("[{kind} trigger]\n")
}

/// Exit report followed by the wait prompt.
pub fn status_banner(outcome: &ExitOutcome) -> String {
    match outcome {
        ExitOutcome::Exited(0) => WAIT_BANNER.to_string(),
        ExitOutcome::Exited(code) => format!("[{code}] {WAIT_BANNER}"),
        ExitOutcome::Signaled(signal) => format!("[{signal}] {WAIT_BANNER}"),
    }
}

/// Error report for an action that never ran, followed by the wait prompt.
pub fn spawn_failure_banner(errno: i32) -> String {
    let ptr = unsafe { libc::strerror(errno) };
    if ptr.is_null() {
        return format!("[error {errno}] {WAIT_BANNER}");
    }
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy();
    format!("[{text}] {WAIT_BANNER}")
}
