//! Event-ports backend for Solaris and illumos.
//!
//! Event ports are oneshot: retrieving an event dissociates its
//! descriptor from the port. The backend therefore keeps its own per-fd
//! interest table plus the set of descriptors the last retrieval handed
//! out, and re-associates those at the top of the next poll. Interest
//! changes for a currently-pending descriptor only touch the table; the
//! next poll applies them.

use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use libc::{
    c_int, c_uint, port_associate, port_create, port_dissociate, port_event, port_getn, timespec,
    EINTR, ETIME, POLLERR, POLLHUP, POLLIN, POLLOUT, PORT_SOURCE_FD,
};
use log::warn;

use super::unix::sys_close;
use crate::event::{Fired, Mask};

/// Most events retrieved by one `port_getn` call.
const MAX_EVENT_BATCHSZ: usize = 512;

pub(crate) struct EvportPoller {
    /// The event port descriptor.
    portfd: RawFd,

    /// Current subscription per descriptor, indexed by fd.
    interest: Vec<Mask>,

    /// Descriptors the last retrieval dissociated.
    pending: Vec<RawFd>,

    /// Reusable kernel-event buffer.
    events: Vec<port_event>,
}

impl EvportPoller {
    pub(crate) const NAME: &'static str = "evport";

    pub(crate) fn new(setsize: usize) -> io::Result<Self> {
        let portfd = unsafe { port_create() };
        if portfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            portfd,
            interest: vec![Mask::NONE; setsize],
            pending: Vec::with_capacity(MAX_EVENT_BATCHSZ),
            events: Vec::with_capacity(MAX_EVENT_BATCHSZ),
        })
    }

    pub(crate) fn resize(&mut self, setsize: usize) -> io::Result<()> {
        self.interest.resize(setsize, Mask::NONE);
        Ok(())
    }

    pub(crate) fn add(&mut self, fd: RawFd, old: Mask, added: Mask) -> io::Result<()> {
        let full = old | added;
        self.interest[fd as usize] = full;
        if self.pending.contains(&fd) {
            // Already dissociated by retrieval; the next poll reapplies.
            return Ok(());
        }
        self.associate(fd, full)
    }

    pub(crate) fn del(&mut self, fd: RawFd, remaining: Mask, _removed: Mask) {
        self.interest[fd as usize] = remaining;
        if self.pending.contains(&fd) {
            return;
        }
        let rc = if remaining.is_none() {
            unsafe { port_dissociate(self.portfd, PORT_SOURCE_FD, fd as _) }
        } else {
            match self.associate(fd, remaining) {
                Ok(()) => 0,
                Err(_) => -1,
            }
        };
        if rc < 0 {
            warn!(
                "event port subscription update for fd={fd} failed: {}",
                io::Error::last_os_error()
            );
        }
    }

    pub(crate) fn poll(
        &mut self,
        fired: &mut Vec<Fired>,
        _maxfd: RawFd,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        fired.clear();

        // Re-associate whatever the previous retrieval knocked out.
        for fd in std::mem::take(&mut self.pending) {
            let mask = self.interest[fd as usize];
            if mask.is_none() {
                continue;
            }
            if let Err(err) = self.associate(fd, mask) {
                warn!("re-associating fd={fd} with the event port failed: {err}");
            }
        }

        let ts;
        let ts_ptr = match timeout {
            Some(d) => {
                ts = timespec {
                    tv_sec: d.as_secs() as _,
                    tv_nsec: d.subsec_nanos() as _,
                };
                &ts as *const timespec as *mut timespec
            }
            None => ptr::null_mut(),
        };

        let mut nget: c_uint = 1;
        let rc = unsafe {
            port_getn(
                self.portfd,
                self.events.as_mut_ptr(),
                MAX_EVENT_BATCHSZ as c_uint,
                &mut nget,
                ts_ptr,
            )
        };
        if rc < 0 {
            // ETIME and EINTR still deliver whatever was retrieved.
            let errno = io::Error::last_os_error();
            match errno.raw_os_error() {
                Some(ETIME) | Some(EINTR) => {}
                _ => return Err(errno),
            }
        }
        unsafe {
            self.events.set_len(nget as usize);
        }

        for ev in &self.events {
            let fd = ev.portev_object as RawFd;
            let bits = ev.portev_events;
            let mut mask = Mask::NONE;
            if bits & POLLIN as c_int != 0 {
                mask |= Mask::READABLE;
            }
            if bits & (POLLOUT | POLLERR | POLLHUP) as c_int != 0 {
                mask |= Mask::WRITABLE;
            }
            fired.push(Fired { fd, mask });
            self.pending.push(fd);
        }
        Ok(fired.len())
    }

    fn associate(&self, fd: RawFd, mask: Mask) -> io::Result<()> {
        let mut bits: c_int = 0;
        if mask.is_readable() {
            bits |= POLLIN as c_int;
        }
        if mask.is_writable() {
            bits |= POLLOUT as c_int;
        }
        let rc = unsafe {
            port_associate(self.portfd, PORT_SOURCE_FD, fd as _, bits, ptr::null_mut())
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for EvportPoller {
    fn drop(&mut self) {
        sys_close(self.portfd);
    }
}
