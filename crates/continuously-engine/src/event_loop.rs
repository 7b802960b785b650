//! The blocking multi-source event loop.

use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use continuously_core::{RunConfig, WatchError, WatchSet};
use is_terminal::IsTerminal;
use libc::c_int;
use tracing::{debug, info};

use crate::console::Console;
use crate::inotify::Inotify;
use crate::runner::{ActionRunner, TriggerKind};
use crate::shutdown::{Cause, Shutdown, shutdown};
use crate::signals::{Signal, SignalFd, SignalSet};
use crate::sys::read_nonblocking;
use crate::terminal::TerminalController;

/// What a keystroke on the interactive input asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Run the action now.
    Trigger,
    /// Quit the watcher.
    Cancel,
    /// Nothing.
    Ignore,
}

/// Map an input byte to its meaning.
pub fn classify(byte: u8) -> KeyAction {
    match byte {
        b'\n' => KeyAction::Trigger,
        b'q' | b'Q' | b'x' | b'X' | 0x1b => KeyAction::Cancel,
        _ => KeyAction::Ignore,
    }
}

/// Owns every piece of watcher state and dispatches readiness to it.
pub struct EventLoop {
    inotify: Inotify,
    signals: SignalFd,
    watches: WatchSet,
    runner: ActionRunner,
    terminal: TerminalController,
    console: Console,
}

impl EventLoop {
    /// Assemble a loop from already prepared parts.
    pub fn new(
        inotify: Inotify,
        signals: SignalFd,
        watches: WatchSet,
        runner: ActionRunner,
        terminal: TerminalController,
        console: Console,
    ) -> Self {
        Self {
            inotify,
            signals,
            watches,
            runner,
            terminal,
            console,
        }
    }

    /// Take over the process: route the watched signals through a
    /// descriptor, check standard input and output, and prepare the runner.
    ///
    /// Must be called before any other thread is started.
    pub fn start(
        config: RunConfig,
        inotify: Inotify,
        watches: WatchSet,
    ) -> Result<Self, WatchError> {
        let set = SignalSet::watched()?;
        set.block()?;
        let signals = SignalFd::new(&set)?;

        let output_is_terminal = std::io::stdout().is_terminal();
        let terminal = TerminalController::setup(libc::STDIN_FILENO, output_is_terminal)?;
        let quiet = config.effective_quiet(output_is_terminal);
        let console = Console::stdout(quiet, output_is_terminal);
        let runner = ActionRunner::new(config, terminal.input_fd(), set);

        Ok(Self::new(inotify, signals, watches, runner, terminal, console))
    }

    /// Print the wait prompt and loop until asked to quit.
    pub fn run(&mut self) -> Result<Shutdown, WatchError> {
        self.console.waiting()?;
        loop {
            if let Some(done) = self.poll_once(None)? {
                return Ok(done);
            }
        }
    }

    /// Wait for readiness once and handle it.
    ///
    /// `None` blocks indefinitely. Returns the shutdown record when the
    /// watcher should exit.
    pub fn poll_once(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<Shutdown>, WatchError> {
        let input_fd = self.terminal.input_fd();

        let mut fds = vec![
            pollfd(self.inotify.as_raw_fd()),
            pollfd(self.signals.as_raw_fd()),
        ];
        if let Some(fd) = input_fd {
            fds.push(pollfd(fd));
        }

        let timeout = timeout.map_or(-1, |d| d.as_millis().min(c_int::MAX as u128) as c_int);
        let r = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
        if r == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(WatchError::os("poll", err));
        }

        if fds[0].revents & libc::POLLIN != 0 {
            self.handle_notifications()?;
            fds[0].revents &= !libc::POLLIN;
        }

        if fds[1].revents & libc::POLLIN != 0 {
            if let Some(done) = self.handle_signal()? {
                return Ok(Some(done));
            }
            fds[1].revents &= !libc::POLLIN;
        }

        if let Some(fd) = input_fd {
            if fds[2].revents & libc::POLLIN != 0 {
                if let Some(done) = self.handle_input(fd)? {
                    return Ok(Some(done));
                }
            }
            fds[2].revents &= !libc::POLLIN;
        }

        if let Some(fd) = fds.iter().find(|fd| fd.revents != 0) {
            return Err(WatchError::UnhandledReadiness {
                fd: fd.fd,
                revents: fd.revents,
            });
        }
        Ok(None)
    }

    fn handle_notifications(&mut self) -> Result<(), WatchError> {
        for notification in self.inotify.read_notifications()? {
            if let Some(name) = &notification.name {
                debug!("inotify event: name={}", name.to_string_lossy());
            }

            let path = self.watches.find_by_handle(notification.handle)?;
            info!("file trigger: {}", path.display());

            self.runner.trigger(TriggerKind::File, &mut self.console)?;
            self.watches.rearm(&mut self.inotify, notification.handle)?;
        }
        Ok(())
    }

    fn handle_signal(&mut self) -> Result<Option<Shutdown>, WatchError> {
        let Some(signal) = self.signals.read_signal()? else {
            return Ok(None);
        };

        if signal == Signal::CHILD {
            self.runner.child_status(&mut self.console)?;
            Ok(None)
        } else if signal.is_termination() {
            self.quit(Cause::Signal(signal)).map(Some)
        } else {
            debug!("ignoring signal: {signal}");
            Ok(None)
        }
    }

    fn handle_input(&mut self, fd: RawFd) -> Result<Option<Shutdown>, WatchError> {
        let mut buf = [0u8; 128];
        loop {
            let n = match read_nonblocking(fd, &mut buf) {
                Ok(None) | Ok(Some(0)) => return Ok(None),
                Ok(Some(n)) => n,
                Err(e) => return Err(WatchError::os("read(input)", e)),
            };

            for &byte in &buf[..n] {
                match classify(byte) {
                    KeyAction::Trigger => {
                        self.runner.trigger(TriggerKind::Manual, &mut self.console)?;
                    }
                    KeyAction::Cancel => return self.quit(Cause::Key(byte)).map(Some),
                    KeyAction::Ignore => {}
                }
            }
        }
    }

    fn quit(&mut self, cause: Cause) -> Result<Shutdown, WatchError> {
        shutdown(cause, &mut self.runner, &mut self.terminal, &mut self.console)
    }

    /// Registered watches.
    pub fn watches(&self) -> &WatchSet {
        &self.watches
    }

    /// The action runner.
    pub fn runner(&self) -> &ActionRunner {
        &self.runner
    }

    /// Mutable access to the action runner.
    pub fn runner_mut(&mut self) -> &mut ActionRunner {
        &mut self.runner
    }

    /// The terminal controller.
    pub fn terminal(&self) -> &TerminalController {
        &self.terminal
    }
}

fn pollfd(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}
