//! `select(2)` fallback backend.
//!
//! The slowest primitive but the one every Unix has. Interest lives in a
//! pair of fd_sets; each poll works on scratch copies because the kernel
//! overwrites its arguments with the ready subset. Capacity is bounded by
//! `FD_SETSIZE`, which both construction and resize enforce.

use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use libc::{fd_set, select, timeval, FD_CLR, FD_ISSET, FD_SET, FD_SETSIZE, FD_ZERO};

use crate::event::{Fired, Mask};

pub(crate) struct SelectPoller {
    /// Read-interest set, mirrored from the registration table.
    rfds: fd_set,

    /// Write-interest set.
    wfds: fd_set,
}

impl SelectPoller {
    pub(crate) const NAME: &'static str = "select";

    pub(crate) fn new(setsize: usize) -> io::Result<Self> {
        if setsize > FD_SETSIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "setsize exceeds FD_SETSIZE",
            ));
        }
        let mut rfds: fd_set = unsafe { mem::zeroed() };
        let mut wfds: fd_set = unsafe { mem::zeroed() };
        unsafe {
            FD_ZERO(&mut rfds);
            FD_ZERO(&mut wfds);
        }
        Ok(Self { rfds, wfds })
    }

    pub(crate) fn resize(&mut self, setsize: usize) -> io::Result<()> {
        if setsize > FD_SETSIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "setsize exceeds FD_SETSIZE",
            ));
        }
        Ok(())
    }

    pub(crate) fn add(&mut self, fd: RawFd, _old: Mask, added: Mask) -> io::Result<()> {
        unsafe {
            if added.is_readable() {
                FD_SET(fd, &mut self.rfds);
            }
            if added.is_writable() {
                FD_SET(fd, &mut self.wfds);
            }
        }
        Ok(())
    }

    pub(crate) fn del(&mut self, fd: RawFd, _remaining: Mask, removed: Mask) {
        unsafe {
            if removed.is_readable() {
                FD_CLR(fd, &mut self.rfds);
            }
            if removed.is_writable() {
                FD_CLR(fd, &mut self.wfds);
            }
        }
    }

    pub(crate) fn poll(
        &mut self,
        fired: &mut Vec<Fired>,
        maxfd: RawFd,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        fired.clear();

        // select scribbles over its arguments; keep the masters intact.
        let mut rfds = self.rfds;
        let mut wfds = self.wfds;

        let mut tv;
        let tv_ptr = match timeout {
            Some(d) => {
                tv = timeval {
                    tv_sec: d.as_secs() as _,
                    tv_usec: d.subsec_micros() as _,
                };
                &mut tv as *mut timeval
            }
            None => ptr::null_mut(),
        };

        let rc = unsafe { select(maxfd + 1, &mut rfds, &mut wfds, ptr::null_mut(), tv_ptr) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(0);
        }

        for fd in 0..=maxfd {
            let mut mask = Mask::NONE;
            unsafe {
                if FD_ISSET(fd, &rfds) {
                    mask |= Mask::READABLE;
                }
                if FD_ISSET(fd, &wfds) {
                    mask |= Mask::WRITABLE;
                }
            }
            if !mask.is_none() {
                fired.push(Fired { fd, mask });
            }
        }
        Ok(fired.len())
    }
}
