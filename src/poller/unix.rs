//! Thin syscall helpers shared by the backends.

use std::io;
use std::os::fd::RawFd;

use libc::{c_int, close, poll, pollfd, POLLERR, POLLHUP, POLLIN, POLLOUT};

use crate::event::Mask;

/// Closes a file descriptor, ignoring the result.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Blocks the calling thread on a single descriptor with `poll(2)` for
/// up to `timeout_ms` milliseconds (negative blocks indefinitely).
///
/// Returns the directions that became available; error and hangup
/// conditions surface as writability. A timeout returns `Mask::NONE`.
pub(crate) fn sys_wait(fd: RawFd, mask: Mask, timeout_ms: i64) -> io::Result<Mask> {
    let mut events: libc::c_short = 0;
    if mask.is_readable() {
        events |= POLLIN;
    }
    if mask.is_writable() {
        events |= POLLOUT;
    }

    let mut pfd = pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout = timeout_ms.min(c_int::MAX as i64) as c_int;

    let rc = unsafe { poll(&mut pfd, 1, timeout) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ready = Mask::NONE;
    if rc > 0 {
        if pfd.revents & POLLIN != 0 {
            ready |= Mask::READABLE;
        }
        if pfd.revents & (POLLOUT | POLLERR | POLLHUP) != 0 {
            ready |= Mask::WRITABLE;
        }
    }
    Ok(ready)
}
