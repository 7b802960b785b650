//! Single-action process lifecycle.

use std::io;
use std::os::fd::RawFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};

use continuously_core::{ENV_MARKER, ENV_MARKER_VALUE, RunConfig, WatchError};
use strum::Display;
use tracing::{debug, info, warn};

use crate::console::Console;
use crate::signals::{Signal, SignalSet};
use crate::sys::cvt;

/// What caused an action to be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TriggerKind {
    /// A watched file changed.
    File,
    /// A newline was typed on the terminal.
    Manual,
}

/// Result of [`ActionRunner::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new action was started.
    Spawned { pid: u32 },
    /// An action was already running; nothing happened.
    AlreadyRunning { pid: u32 },
    /// The action process could not exec the command; nothing is running.
    Failed { errno: i32 },
}

/// How a reaped action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with a status code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled(Signal),
}

impl ExitOutcome {
    fn from_status(pid: u32, status: ExitStatus) -> Result<Self, WatchError> {
        if let Some(code) = status.code() {
            Ok(Self::Exited(code))
        } else if let Some(signal) = status.signal() {
            Ok(Self::Signaled(Signal(signal)))
        } else {
            Err(WatchError::UnexpectedStatus {
                pid,
                status: status.to_string(),
            })
        }
    }
}

/// Runs the configured command, at most one instance at a time.
pub struct ActionRunner {
    config: RunConfig,
    input_fd: Option<RawFd>,
    signals: SignalSet,
    child: Option<Child>,
    /// Failed spawns whose child-status signal has not been seen yet.
    unclaimed_failures: usize,
}

impl ActionRunner {
    /// Create a runner.
    ///
    /// `input_fd` is the interactive input descriptor, hidden from actions;
    /// `signals` is the set blocked in the watcher and unblocked in actions.
    pub fn new(config: RunConfig, input_fd: Option<RawFd>, signals: SignalSet) -> Self {
        Self {
            config,
            input_fd,
            signals,
            child: None,
            unclaimed_failures: 0,
        }
    }

    /// Whether an action is running.
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Pid of the running action.
    pub fn running_pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Start the action unless one is already running.
    ///
    /// Triggers that arrive while an action runs are dropped, not queued.
    pub fn trigger(
        &mut self,
        kind: TriggerKind,
        console: &mut Console,
    ) -> Result<TriggerOutcome, WatchError> {
        if let Some(pid) = self.running_pid() {
            info!("action triggered while child is still running");
            return Ok(TriggerOutcome::AlreadyRunning { pid });
        }

        let child = match self.spawn() {
            Ok(child) => child,
            Err(e) => return self.spawn_failed(kind, e, console),
        };
        let pid = child.id();
        self.child = Some(child);
        info!("spawned action: {pid}");

        console.triggered(kind)?;
        Ok(TriggerOutcome::Spawned { pid })
    }

    /// Sort a spawn error into the child's failure or the watcher's.
    ///
    /// The child has already been reaped by `spawn`, but its child-status
    /// signal is still pending and is claimed by [`child_status`](Self::child_status).
    fn spawn_failed(
        &mut self,
        kind: TriggerKind,
        err: io::Error,
        console: &mut Console,
    ) -> Result<TriggerOutcome, WatchError> {
        let program = self.config.program().to_string_lossy().into_owned();
        let errno = match err.raw_os_error() {
            Some(errno) if !is_parent_failure(errno) => errno,
            _ => return Err(WatchError::os(format!("spawn({program})"), err)),
        };

        warn!("failed to start action ({program}): {err}");
        self.unclaimed_failures += 1;

        console.triggered(kind)?;
        console.spawn_failed(errno)?;
        Ok(TriggerOutcome::Failed { errno })
    }

    fn spawn(&self) -> io::Result<Child> {
        let mut command = Command::new(self.config.program());
        command
            .args(self.config.args())
            .env(ENV_MARKER, ENV_MARKER_VALUE);

        // an action must never share the raw-mode terminal
        let input_fd = self.input_fd;
        if input_fd == Some(libc::STDIN_FILENO) {
            command.stdin(Stdio::null());
        }

        let signals = self.signals;
        unsafe {
            command.pre_exec(move || {
                if let Some(fd) = input_fd.filter(|fd| *fd != libc::STDIN_FILENO) {
                    if libc::close(fd) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                }
                signals.unblock().map_err(io::Error::other)?;
                Ok(())
            });
        }

        command.spawn()
    }

    /// Reap the running action without blocking, if it has finished.
    pub fn try_reap(&mut self) -> Result<Option<ExitOutcome>, WatchError> {
        let child = self.child.as_mut().ok_or(WatchError::NoRunningAction)?;
        let pid = child.id();

        let status = child
            .try_wait()
            .map_err(|e| WatchError::os(format!("waitpid({pid})"), e))?;
        let Some(status) = status else {
            return Ok(None);
        };

        self.child = None;
        ExitOutcome::from_status(pid, status).map(Some)
    }

    /// Reap the action after a child-status notification and report it.
    ///
    /// The notification promises the tracked action has changed state, so
    /// finding it still running is fatal.
    pub fn reap(&mut self, console: &mut Console) -> Result<ExitOutcome, WatchError> {
        let expected = self.running_pid().ok_or(WatchError::NoRunningAction)?;
        let outcome = self.try_reap()?.ok_or(WatchError::PidMismatch {
            expected,
            reaped: None,
        })?;
        Self::report(expected, outcome, console)?;
        Ok(outcome)
    }

    /// Handle a child-status notification.
    ///
    /// Like [`reap`](Self::reap), except that a notification finding nothing
    /// to reap is accepted once for every failed spawn. Returns `None` when
    /// the notification belonged to such a failure.
    pub fn child_status(
        &mut self,
        console: &mut Console,
    ) -> Result<Option<ExitOutcome>, WatchError> {
        if self.unclaimed_failures == 0 {
            return self.reap(console).map(Some);
        }

        if let Some(pid) = self.running_pid() {
            if let Some(outcome) = self.try_reap()? {
                Self::report(pid, outcome, console)?;
                return Ok(Some(outcome));
            }
        }

        self.unclaimed_failures -= 1;
        debug!("child status of a failed spawn");
        Ok(None)
    }

    fn report(pid: u32, outcome: ExitOutcome, console: &mut Console) -> Result<(), WatchError> {
        match outcome {
            ExitOutcome::Exited(code) => info!("action ({pid}) exited: {code}"),
            ExitOutcome::Signaled(signal) => info!("action ({pid}) signaled: {signal}"),
        }
        console.finished(&outcome)
    }

    /// Deliver `signal` to the running action.
    ///
    /// Returns the pid signalled, `None` if nothing is running.
    pub fn signal(&self, signal: Signal) -> Result<Option<u32>, WatchError> {
        let Some(pid) = self.running_pid() else {
            return Ok(None);
        };

        info!("signalling running action ({pid}): {signal}");
        cvt(
            unsafe { libc::kill(pid as libc::pid_t, signal.raw()) },
            &format!("kill({pid}, {signal})"),
        )?;
        Ok(Some(pid))
    }
}

/// Errors `spawn` reports for the watcher's own side of the fork.
fn is_parent_failure(errno: i32) -> bool {
    matches!(
        errno,
        libc::EAGAIN | libc::ENOMEM | libc::EMFILE | libc::ENFILE
    )
}
