//! Synchronous signal delivery through `signalfd`.
//!
//! The watched signals are blocked for the whole process and read from a
//! descriptor, so they are observed in order with file and terminal events.

use std::ffi::CStr;
use std::fmt;
use std::mem::{size_of, MaybeUninit};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use continuously_core::WatchError;
use libc::c_int;

use crate::sys::{cvt, read_nonblocking};

/// A signal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal(pub c_int);

impl Signal {
    pub const INTERRUPT: Signal = Signal(libc::SIGINT);
    pub const QUIT: Signal = Signal(libc::SIGQUIT);
    pub const TERMINATE: Signal = Signal(libc::SIGTERM);
    pub const CHILD: Signal = Signal(libc::SIGCHLD);

    /// Raw signal number.
    pub fn raw(self) -> c_int {
        self.0
    }

    /// Whether this signal asks the watcher to quit.
    pub fn is_termination(self) -> bool {
        matches!(self, Self::INTERRUPT | Self::QUIT | Self::TERMINATE)
    }

    /// Human readable description, as printed by `strsignal(3)`.
    pub fn name(self) -> String {
        let ptr = unsafe { libc::strsignal(self.0) };
        if ptr.is_null() {
            return format!("signal {}", self.0);
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Set of signals routed through a [`SignalFd`].
#[derive(Clone, Copy)]
pub struct SignalSet {
    set: libc::sigset_t,
}

impl SignalSet {
    /// Interrupt, quit, terminate and child-status.
    pub fn watched() -> Result<Self, WatchError> {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        cvt(unsafe { libc::sigemptyset(set.as_mut_ptr()) }, "sigemptyset")?;
        let mut set = Self {
            set: unsafe { set.assume_init() },
        };
        for signal in [Signal::INTERRUPT, Signal::QUIT, Signal::TERMINATE, Signal::CHILD] {
            set.add(signal)?;
        }
        Ok(set)
    }

    fn add(&mut self, signal: Signal) -> Result<(), WatchError> {
        cvt(unsafe { libc::sigaddset(&mut self.set, signal.raw()) }, "sigaddset")?;
        Ok(())
    }

    /// Whether `signal` is a member of the set.
    pub fn contains(&self, signal: Signal) -> bool {
        unsafe { libc::sigismember(&self.set, signal.raw()) == 1 }
    }

    /// Block the set so it is only delivered through a [`SignalFd`].
    pub fn block(&self) -> Result<(), WatchError> {
        self.mask(libc::SIG_BLOCK)
    }

    /// Undo [`block`](Self::block).
    ///
    /// Async-signal-safe, so it may run between fork and exec.
    pub fn unblock(&self) -> Result<(), WatchError> {
        self.mask(libc::SIG_UNBLOCK)
    }

    fn mask(&self, how: c_int) -> Result<(), WatchError> {
        let r = unsafe { libc::pthread_sigmask(how, &self.set, std::ptr::null_mut()) };
        if r != 0 {
            return Err(WatchError::os(
                "pthread_sigmask",
                std::io::Error::from_raw_os_error(r),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<_> = [Signal::INTERRUPT, Signal::QUIT, Signal::TERMINATE, Signal::CHILD]
            .into_iter()
            .filter(|s| self.contains(*s))
            .map(|s| s.raw())
            .collect();
        f.debug_struct("SignalSet").field("members", &members).finish()
    }
}

/// Descriptor that becomes readable when a member of its set is pending.
#[derive(Debug)]
pub struct SignalFd {
    fd: OwnedFd,
}

impl SignalFd {
    /// Create a non-blocking, close-on-exec descriptor for `set`.
    pub fn new(set: &SignalSet) -> Result<Self, WatchError> {
        let fd = cvt(
            unsafe { libc::signalfd(-1, &set.set, libc::SFD_NONBLOCK | libc::SFD_CLOEXEC) },
            "signalfd",
        )?;
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Read exactly one pending signal, `None` if nothing is pending.
    pub fn read_signal(&self) -> Result<Option<Signal>, WatchError> {
        let mut buf = [0u8; size_of::<libc::signalfd_siginfo>()];
        match read_nonblocking(self.fd.as_raw_fd(), &mut buf) {
            Ok(None) => Ok(None),
            Ok(Some(n)) => decode_siginfo(&buf[..n]).map(Some),
            Err(e) => Err(WatchError::os("read(signalfd)", e)),
        }
    }
}

impl AsFd for SignalFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for SignalFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Decode one `signalfd_siginfo` record.
pub fn decode_siginfo(buf: &[u8]) -> Result<Signal, WatchError> {
    if buf.len() != size_of::<libc::signalfd_siginfo>() {
        return Err(WatchError::PartialRead {
            origin: "signalfd",
            got: buf.len(),
        });
    }

    let info: libc::signalfd_siginfo = unsafe { std::ptr::read_unaligned(buf.as_ptr().cast()) };
    Ok(Signal(info.ssi_signo as c_int))
}
