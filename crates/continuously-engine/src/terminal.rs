//! Terminal probing and raw-mode control.

use std::mem::MaybeUninit;
use std::os::fd::RawFd;

use continuously_core::WatchError;
use libc::c_int;
use tracing::{debug, warn};

use crate::sys::{cvt, set_nonblocking, set_status_flags};

/// Input descriptor state captured before switching to raw mode.
struct SavedInput {
    fd: RawFd,
    termios: libc::termios,
    flags: c_int,
}

/// Owns the interactive input descriptor and its original settings.
///
/// Input is only interactive when the descriptor is a genuine terminal; it
/// is then switched to raw mode (no echo, no line buffering, signal keys
/// still active) and made non-blocking. The original settings are put back
/// exactly once, by [`restore`](Self::restore) or on drop.
pub struct TerminalController {
    input: Option<SavedInput>,
    output_is_terminal: bool,
    restored: bool,
}

impl TerminalController {
    /// Probe `input_fd` and take it over if it is a terminal.
    pub fn setup(input_fd: RawFd, output_is_terminal: bool) -> Result<Self, WatchError> {
        let input = match get_attrs(input_fd)? {
            None => {
                debug!("input is not a terminal: manual triggers disabled");
                None
            }
            Some(termios) => {
                let mut raw = termios;
                raw.c_lflag &= !(libc::ECHO | libc::ICANON);
                set_attrs(input_fd, &raw)?;
                let flags = set_nonblocking(input_fd)?;
                Some(SavedInput {
                    fd: input_fd,
                    termios,
                    flags,
                })
            }
        };

        Ok(Self {
            input,
            output_is_terminal,
            restored: false,
        })
    }

    /// A controller with interactive input disabled.
    pub fn disabled(output_is_terminal: bool) -> Self {
        Self {
            input: None,
            output_is_terminal,
            restored: false,
        }
    }

    /// Descriptor to read keystrokes from, if input is interactive.
    pub fn input_fd(&self) -> Option<RawFd> {
        self.input.as_ref().map(|saved| saved.fd)
    }

    /// Whether keystrokes are read.
    pub fn is_interactive(&self) -> bool {
        self.input.is_some()
    }

    /// Whether the output descriptor is a terminal.
    pub fn output_is_terminal(&self) -> bool {
        self.output_is_terminal
    }

    /// Put the input descriptor back the way it was found.
    ///
    /// Later calls are no-ops.
    pub fn restore(&mut self) -> Result<(), WatchError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        if let Some(saved) = &self.input {
            set_attrs(saved.fd, &saved.termios)?;
            set_status_flags(saved.fd, saved.flags)?;
            debug!("terminal restored");
        }
        Ok(())
    }
}

impl Drop for TerminalController {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("failed to restore terminal: {e}");
        }
    }
}

/// Terminal attributes of `fd`, `None` if it is not a terminal.
fn get_attrs(fd: RawFd) -> Result<Option<libc::termios>, WatchError> {
    let mut termios = MaybeUninit::<libc::termios>::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } == 0 {
        return Ok(Some(unsafe { termios.assume_init() }));
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ENOTTY) => Ok(None),
        _ => Err(WatchError::os("tcgetattr", err)),
    }
}

fn set_attrs(fd: RawFd, termios: &libc::termios) -> Result<(), WatchError> {
    cvt(unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) }, "tcsetattr")?;
    Ok(())
}
