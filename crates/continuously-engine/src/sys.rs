//! Thin wrappers over the libc calls the engine needs.

use std::io;
use std::os::fd::RawFd;

use continuously_core::WatchError;
use libc::c_int;

/// Turn a `-1` return into an error carrying `errno`.
pub(crate) fn cvt(ret: c_int, operation: &str) -> Result<c_int, WatchError> {
    if ret == -1 {
        Err(WatchError::last_os(operation))
    } else {
        Ok(ret)
    }
}

/// Read from a non-blocking descriptor.
///
/// Returns `Ok(None)` when no data is available.
pub(crate) fn read_nonblocking(fd: RawFd, buf: &mut [u8]) -> io::Result<Option<usize>> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if n >= 0 {
        return Ok(Some(n as usize));
    }

    let err = io::Error::last_os_error();
    match err.kind() {
        io::ErrorKind::WouldBlock => Ok(None),
        _ => Err(err),
    }
}

/// File status flags of `fd`.
pub(crate) fn status_flags(fd: RawFd) -> Result<c_int, WatchError> {
    cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) }, "fcntl(F_GETFL)")
}

/// Replace the file status flags of `fd`.
pub(crate) fn set_status_flags(fd: RawFd, flags: c_int) -> Result<(), WatchError> {
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) }, "fcntl(F_SETFL)")?;
    Ok(())
}

/// Switch `fd` to non-blocking mode, returning the previous flags.
pub(crate) fn set_nonblocking(fd: RawFd) -> Result<c_int, WatchError> {
    let flags = status_flags(fd)?;
    set_status_flags(fd, flags | libc::O_NONBLOCK)?;
    Ok(flags)
}

/// Wait until everything written to the terminal `fd` has been transmitted.
pub(crate) fn drain(fd: RawFd) -> Result<(), WatchError> {
    cvt(unsafe { libc::tcdrain(fd) }, "tcdrain")?;
    Ok(())
}
