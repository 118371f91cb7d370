//! Linux `epoll`-based backend.
//!
//! Responsibilities:
//! - subscribe descriptors for read/write interest, cumulatively
//! - block waiting for readiness, bounded by the loop's timer horizon
//! - translate kernel events into `(fd, mask)` fired entries
//!
//! This backend is selected automatically on Linux targets.

use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use libc::{
    epoll_create1, epoll_ctl, epoll_event, epoll_wait, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD,
};

use super::unix::sys_close;
use crate::event::{Fired, Mask};

pub(crate) struct EpollPoller {
    /// Epoll instance descriptor.
    epfd: RawFd,

    /// Reusable kernel-event buffer, sized to the loop's setsize.
    events: Vec<epoll_event>,
}

impl EpollPoller {
    pub(crate) const NAME: &'static str = "epoll";

    pub(crate) fn new(setsize: usize) -> io::Result<Self> {
        let epfd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epfd,
            events: Vec::with_capacity(setsize.max(1)),
        })
    }

    pub(crate) fn resize(&mut self, setsize: usize) -> io::Result<()> {
        self.events = Vec::with_capacity(setsize.max(1));
        Ok(())
    }

    /// Subscribe `added` directions for `fd`, on top of whatever `old`
    /// directions were already subscribed.
    pub(crate) fn add(&mut self, fd: RawFd, old: Mask, added: Mask) -> io::Result<()> {
        // A descriptor already known to the kernel is modified, not re-added.
        let op = if old.is_none() {
            EPOLL_CTL_ADD
        } else {
            EPOLL_CTL_MOD
        };
        let mut event = epoll_event {
            events: interest_bits(old | added),
            u64: fd as u64,
        };
        let rc = unsafe { epoll_ctl(self.epfd, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Drop directions from `fd`'s subscription; `remaining` is what the
    /// registration keeps. Empty `remaining` removes the descriptor.
    pub(crate) fn del(&mut self, fd: RawFd, remaining: Mask, _removed: Mask) {
        if remaining.is_none() {
            unsafe { epoll_ctl(self.epfd, EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        } else {
            let mut event = epoll_event {
                events: interest_bits(remaining),
                u64: fd as u64,
            };
            unsafe { epoll_ctl(self.epfd, EPOLL_CTL_MOD, fd, &mut event) };
        }
    }

    /// Block until readiness or timeout; `None` blocks indefinitely.
    ///
    /// Fills `fired` with one entry per ready descriptor and returns the
    /// count. Interrupted waits report zero events.
    pub(crate) fn poll(
        &mut self,
        fired: &mut Vec<Fired>,
        _maxfd: RawFd,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        fired.clear();

        let timeout_ms = match timeout {
            Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };

        let n = unsafe {
            epoll_wait(
                self.epfd,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
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
            let mut mask = Mask::NONE;
            if ev.events & EPOLLIN as u32 != 0 {
                mask |= Mask::READABLE;
            }
            if ev.events & EPOLLOUT as u32 != 0 {
                mask |= Mask::WRITABLE;
            }
            // Error and hangup surface as writability.
            if ev.events & (EPOLLERR | EPOLLHUP) as u32 != 0 {
                mask |= Mask::WRITABLE;
            }
            fired.push(Fired {
                fd: ev.u64 as RawFd,
                mask,
            });
        }
        Ok(fired.len())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        sys_close(self.epfd);
    }
}

fn interest_bits(mask: Mask) -> u32 {
    let mut bits = 0u32;
    if mask.is_readable() {
        bits |= EPOLLIN as u32;
    }
    if mask.is_writable() {
        bits |= EPOLLOUT as u32;
    }
    bits
}
