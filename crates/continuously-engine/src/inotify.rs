//! File-change notification source.

use std::ffi::{CString, OsString};
use std::mem::size_of;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use continuously_core::{Registrar, WatchError, WatchHandle};

use crate::sys::{cvt, read_nonblocking};

const HEADER_LEN: usize = size_of::<libc::inotify_event>();

/// Largest single record: header plus a maximal, NUL-terminated name.
const RECORD_MAX: usize = HEADER_LEN + libc::NAME_MAX as usize + 1;

/// One decoded change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Watch that fired.
    pub handle: WatchHandle,
    /// Event mask reported by the kernel.
    pub mask: u32,
    /// Entry name, only present for directory watches.
    pub name: Option<OsString>,
}

/// An inotify instance watching files for modification.
#[derive(Debug)]
pub struct Inotify {
    fd: OwnedFd,
}

impl Inotify {
    /// Create a non-blocking, close-on-exec inotify instance.
    pub fn new() -> Result<Self, WatchError> {
        let fd = cvt(
            unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) },
            "inotify_init1",
        )?;
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Read the pending notifications.
    ///
    /// The kernel only hands out whole records; anything else is fatal. An
    /// empty vector means the read would have blocked.
    pub fn read_notifications(&self) -> Result<Vec<Notification>, WatchError> {
        let mut buf = [0u8; RECORD_MAX];
        match read_nonblocking(self.fd.as_raw_fd(), &mut buf) {
            Ok(None) => Ok(Vec::new()),
            Ok(Some(n)) => decode_notifications(&buf[..n]),
            Err(e) => Err(WatchError::os("read(inotify)", e)),
        }
    }
}

impl Registrar for Inotify {
    fn register(&mut self, path: &Path) -> Result<Option<WatchHandle>, WatchError> {
        let cpath = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
            WatchError::path("inotify_add_watch", path, std::io::Error::other(e))
        })?;

        let wd = unsafe {
            libc::inotify_add_watch(self.fd.as_raw_fd(), cpath.as_ptr(), libc::IN_MODIFY)
        };
        if wd >= 0 {
            return Ok(Some(WatchHandle::new(wd)));
        }

        let err = std::io::Error::last_os_error();
        match err.kind() {
            std::io::ErrorKind::NotFound => Ok(None),
            _ => Err(WatchError::path("inotify_add_watch", path, err)),
        }
    }
}

impl AsFd for Inotify {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Inotify {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Split a read buffer into notification records.
pub fn decode_notifications(buf: &[u8]) -> Result<Vec<Notification>, WatchError> {
    if buf.is_empty() {
        return Err(WatchError::PartialRead {
            origin: "inotify",
            got: 0,
        });
    }

    let mut records = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        if rest.len() < HEADER_LEN {
            return Err(WatchError::PartialRead {
                origin: "inotify",
                got: buf.len(),
            });
        }

        let event: libc::inotify_event =
            unsafe { std::ptr::read_unaligned(rest.as_ptr().cast()) };
        let len = event.len as usize;
        if rest.len() < HEADER_LEN + len {
            return Err(WatchError::PartialRead {
                origin: "inotify",
                got: buf.len(),
            });
        }

        // names are NUL padded to the record length
        let name = &rest[HEADER_LEN..HEADER_LEN + len];
        let name = match name.iter().position(|b| *b == 0) {
            Some(end) => &name[..end],
            None => name,
        };

        records.push(Notification {
            handle: WatchHandle::new(event.wd),
            mask: event.mask,
            name: (!name.is_empty()).then(|| OsString::from_vec(name.to_vec())),
        });
        rest = &rest[HEADER_LEN + len..];
    }

    Ok(records)
}
