//! `kqueue`-based backend for macOS and the BSDs.
//!
//! kqueue tracks read and write interest as two separate filters, so a
//! subscription change turns into up to two changelist entries, and a
//! descriptor ready in both directions comes back as two kernel events.
//! The poll step merges those into a single fired entry per descriptor
//! so the loop sees the same shape every backend produces.

use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use libc::{c_int, kevent, kqueue, timespec, EVFILT_READ, EVFILT_WRITE, EV_ADD, EV_DELETE};

use super::unix::sys_close;
use crate::event::{Fired, Mask};

pub(crate) struct KqueuePoller {
    /// The kqueue descriptor.
    kq: RawFd,

    /// Reusable kernel-event buffer, sized to the loop's setsize.
    events: Vec<kevent>,
}

impl KqueuePoller {
    pub(crate) const NAME: &'static str = "kqueue";

    pub(crate) fn new(setsize: usize) -> io::Result<Self> {
        let kq = unsafe { kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            kq,
            events: Vec::with_capacity(setsize.max(1)),
        })
    }

    pub(crate) fn resize(&mut self, setsize: usize) -> io::Result<()> {
        self.events = Vec::with_capacity(setsize.max(1));
        Ok(())
    }

    pub(crate) fn add(&mut self, fd: RawFd, _old: Mask, added: Mask) -> io::Result<()> {
        let mut changes: [kevent; 2] = unsafe { mem::zeroed() };
        let mut n = 0;
        if added.is_readable() {
            changes[n].ident = fd as _;
            changes[n].filter = EVFILT_READ as _;
            changes[n].flags = EV_ADD as _;
            n += 1;
        }
        if added.is_writable() {
            changes[n].ident = fd as _;
            changes[n].filter = EVFILT_WRITE as _;
            changes[n].flags = EV_ADD as _;
            n += 1;
        }

        let rc = unsafe {
            kevent(
                self.kq,
                changes.as_ptr(),
                n as c_int,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(crate) fn del(&mut self, fd: RawFd, _remaining: Mask, removed: Mask) {
        let mut changes: [kevent; 2] = unsafe { mem::zeroed() };
        let mut n = 0;
        if removed.is_readable() {
            changes[n].ident = fd as _;
            changes[n].filter = EVFILT_READ as _;
            changes[n].flags = EV_DELETE as _;
            n += 1;
        }
        if removed.is_writable() {
            changes[n].ident = fd as _;
            changes[n].filter = EVFILT_WRITE as _;
            changes[n].flags = EV_DELETE as _;
            n += 1;
        }

        unsafe {
            kevent(
                self.kq,
                changes.as_ptr(),
                n as c_int,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
    }

    pub(crate) fn poll(
        &mut self,
        fired: &mut Vec<Fired>,
        _maxfd: RawFd,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        fired.clear();

        let ts;
        let ts_ptr = match timeout {
            Some(d) => {
                ts = timespec {
                    tv_sec: d.as_secs() as _,
                    tv_nsec: d.subsec_nanos() as _,
                };
                &ts as *const timespec
            }
            None => ptr::null(),
        };

        let n = unsafe {
            kevent(
                self.kq,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as c_int,
                ts_ptr,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            let fd = ev.ident as RawFd;
            let mut mask = Mask::NONE;
            if ev.filter as i64 == EVFILT_READ as i64 {
                mask |= Mask::READABLE;
            }
            if ev.filter as i64 == EVFILT_WRITE as i64 {
                mask |= Mask::WRITABLE;
            }
            // The two filters of one descriptor collapse into one entry.
            if let Some(entry) = fired.iter_mut().find(|f| f.fd == fd) {
                entry.mask |= mask;
            } else {
                fired.push(Fired { fd, mask });
            }
        }
        Ok(fired.len())
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        sys_close(self.kq);
    }
}
