//! The event loop: registration tables, tick dispatch, and the driver.
//!
//! One `EventLoop` owns a descriptor-indexed table of file-event slots,
//! a buffer of fired events the poller refills each tick, and an
//! unsorted list of pending timers. A tick polls the kernel with a
//! timeout derived from the nearest timer, dispatches every ready
//! descriptor, then fires every ripe timer. Everything runs on the
//! calling thread; callbacks receive the loop itself and may mutate it
//! freely between syscalls.

use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::event::{ClientData, FileProc, Fired, Flags, HookProc, Mask};
use crate::list::{Direction, List, NodeId};
use crate::poller::unix::sys_wait;
use crate::poller::Poller;
use crate::timer::{
    add_millis_to_now, current_time, FinalizerProc, TimeAction, TimeEvent, TimeProc, TimerId,
};

/// One slot of the descriptor-indexed registration table.
///
/// A slot is registered iff its mask is not `NONE`; the read callback is
/// present iff `READABLE` is in the mask, the write callback iff
/// `WRITABLE` is.
#[derive(Default)]
struct FileEvent {
    mask: Mask,
    rproc: Option<FileProc>,
    wproc: Option<FileProc>,
    data: Option<ClientData>,
}

/// A single-threaded reactor multiplexing descriptor readiness and
/// wall-clock timers over one kernel polling primitive.
pub struct EventLoop {
    /// Capacity of the descriptor tables; registered fds are below this.
    setsize: usize,

    /// Largest registered descriptor, -1 when none is.
    maxfd: RawFd,

    /// Registration table, indexed by descriptor.
    events: Vec<FileEvent>,

    /// Readiness reported by the last poll; valid until the next one.
    fired: Vec<Fired>,

    /// Pending timers, unsorted, newest first.
    timers: List<TimeEvent>,

    /// Next timer identifier to hand out.
    time_next_id: TimerId,

    /// Wall-clock seconds observed by the previous timer pass, for
    /// backwards-skew detection.
    last_time: i64,

    stop: bool,
    poller: Poller,
    before_sleep: Option<HookProc>,
    after_sleep: Option<HookProc>,
}

impl EventLoop {
    /// Create a loop able to track descriptors in `[0, setsize)`.
    ///
    /// Fails if the kernel primitive cannot be set up (or, on the select
    /// backend, if `setsize` exceeds `FD_SETSIZE`); nothing is left
    /// behind on failure.
    pub fn new(setsize: usize) -> Result<EventLoop> {
        let poller = Poller::new(setsize)?;
        let (last_time, _) = current_time();
        let mut events = Vec::new();
        events.resize_with(setsize, FileEvent::default);

        debug!("event loop created: backend={} setsize={setsize}", Poller::NAME);
        Ok(EventLoop {
            setsize,
            maxfd: -1,
            events,
            fired: Vec::with_capacity(setsize),
            timers: List::new(),
            time_next_id: 0,
            last_time,
            stop: false,
            poller,
            before_sleep: None,
            after_sleep: None,
        })
    }

    pub fn setsize(&self) -> usize {
        self.setsize
    }

    /// Largest registered descriptor, -1 when nothing is registered.
    pub fn max_fd(&self) -> RawFd {
        self.maxfd
    }

    /// Number of pending timers.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Grow or shrink the descriptor tables.
    ///
    /// A no-op when the size is unchanged; refused when it would orphan
    /// a registered descriptor. Existing registrations are preserved and
    /// new slots start unregistered. On failure the previous tables stay
    /// valid.
    pub fn resize_setsize(&mut self, setsize: usize) -> Result<()> {
        if setsize == self.setsize {
            return Ok(());
        }
        if self.maxfd as i64 >= setsize as i64 {
            return Err(Error::Shrink {
                requested: setsize,
                maxfd: self.maxfd,
            });
        }
        self.poller.resize(setsize)?;
        self.events.resize_with(setsize, FileEvent::default);
        self.fired = Vec::with_capacity(setsize);
        self.setsize = setsize;
        Ok(())
    }

    /// Install `hook` to run at the top of every [`EventLoop::run`]
    /// iteration, before the tick. `None` uninstalls.
    pub fn set_before_sleep(&mut self, hook: Option<HookProc>) {
        self.before_sleep = hook;
    }

    /// Install `hook` to run right after the poller returns, before any
    /// dispatch. `None` uninstalls.
    pub fn set_after_sleep(&mut self, hook: Option<HookProc>) {
        self.after_sleep = hook;
    }

    /// Subscribe `fd` for the given directions and install `proc` as the
    /// callback for each of them. Repeated calls are cumulative; handing
    /// the same `Rc` to both directions makes the loop invoke it once
    /// per tick with the combined readiness.
    ///
    /// The registration holds one reference to `data` until the last
    /// direction is removed.
    pub fn add_file_event(
        &mut self,
        fd: RawFd,
        mask: Mask,
        proc: FileProc,
        data: ClientData,
    ) -> Result<()> {
        if fd < 0 || fd as usize >= self.setsize {
            return Err(Error::Range {
                fd,
                setsize: self.setsize,
            });
        }
        // An empty mask subscribes nothing and must not disturb maxfd.
        if mask.is_none() {
            return Ok(());
        }
        trace!("registering fd={fd} mask={mask:?}");

        let old = self.events[fd as usize].mask;
        self.poller.add(fd, old, mask)?;

        let fe = &mut self.events[fd as usize];
        fe.mask |= mask;
        if mask.is_readable() {
            fe.rproc = Some(proc.clone());
        }
        if mask.is_writable() {
            fe.wproc = Some(proc);
        }
        fe.data = Some(data);
        if fd > self.maxfd {
            self.maxfd = fd;
        }
        Ok(())
    }

    /// Drop the given directions from `fd`'s registration. Unknown
    /// descriptors and unregistered slots are ignored. When the last
    /// direction goes, the slot is cleared and `maxfd` is recomputed.
    pub fn del_file_event(&mut self, fd: RawFd, mask: Mask) {
        if fd < 0 || fd as usize >= self.setsize {
            return;
        }
        if self.events[fd as usize].mask.is_none() {
            return;
        }
        trace!("unregistering fd={fd} mask={mask:?}");

        let remaining = self.events[fd as usize].mask & !mask;
        self.poller.del(fd, remaining, mask);

        let fe = &mut self.events[fd as usize];
        fe.mask = remaining;
        if !remaining.is_readable() {
            fe.rproc = None;
        }
        if !remaining.is_writable() {
            fe.wproc = None;
        }
        if remaining.is_none() {
            fe.data = None;
            if fd == self.maxfd {
                // Walk down to the next registered slot.
                let mut j = self.maxfd - 1;
                while j >= 0 && self.events[j as usize].mask.is_none() {
                    j -= 1;
                }
                self.maxfd = j;
            }
        }
    }

    /// The directions `fd` is currently registered for.
    pub fn file_events(&self, fd: RawFd) -> Mask {
        if fd < 0 || fd as usize >= self.setsize {
            return Mask::NONE;
        }
        self.events[fd as usize].mask
    }

    /// A handle to the payload registered with `fd`, if any.
    pub fn file_client_data(&self, fd: RawFd) -> Option<ClientData> {
        if fd < 0 || fd as usize >= self.setsize {
            return None;
        }
        self.events[fd as usize].data.clone()
    }

    /// Arm a timer `milliseconds` from now and return its identifier.
    ///
    /// The callback's [`TimeAction`] decides between one-shot and
    /// periodic. The finalizer, if any, runs when the timer is removed,
    /// whether by [`EventLoop::del_time_event`] or by returning
    /// [`TimeAction::Done`].
    pub fn add_time_event(
        &mut self,
        milliseconds: i64,
        proc: TimeProc,
        data: ClientData,
        finalizer: Option<FinalizerProc>,
    ) -> TimerId {
        let id = self.time_next_id;
        self.time_next_id += 1;
        let (when_sec, when_ms) = add_millis_to_now(milliseconds);
        trace!("arming timer id={id} in {milliseconds}ms");
        self.timers.push_head(TimeEvent {
            id,
            when_sec,
            when_ms,
            proc,
            finalizer,
            data,
        });
        id
    }

    /// Delete a pending timer by identifier, running its finalizer.
    pub fn del_time_event(&mut self, id: TimerId) -> Result<()> {
        let Some(node) = self.timer_node(id) else {
            return Err(Error::TimerNotFound(id));
        };
        trace!("removing timer id={id}");
        let te = self.timers.take(node);
        if let Some(finalizer) = te.finalizer.clone() {
            finalizer(self, &te.data);
        }
        Ok(())
    }

    /// Run one tick: poll the kernel (bounded by the nearest timer when
    /// timers are in play), dispatch every ready descriptor, then fire
    /// every ripe timer. Returns how many events were processed.
    ///
    /// With [`Flags::DONT_WAIT`] the poll never blocks. Requesting
    /// neither file nor time events returns zero immediately.
    pub fn process_events(&mut self, flags: Flags) -> usize {
        let mut processed = 0;
        if !flags.intersects(Flags::ALL) {
            return 0;
        }

        // Enter the poller even with no descriptor registered when a
        // timer wait is wanted: the poll timeout doubles as the sleep.
        if self.maxfd != -1
            || (flags.contains(Flags::TIME) && !flags.contains(Flags::DONT_WAIT))
        {
            let timeout = if flags.contains(Flags::TIME) && !flags.contains(Flags::DONT_WAIT) {
                self.nearest_timer_delay()
            } else {
                None
            };
            let timeout = match timeout {
                Some(delay) => Some(delay),
                None if flags.contains(Flags::DONT_WAIT) => Some(Duration::ZERO),
                None => None, // wait forever
            };

            let numevents = match self.poller.poll(&mut self.fired, self.maxfd, timeout) {
                Ok(n) => n,
                Err(err) => {
                    warn!("poll failed: {err}");
                    0
                }
            };

            if let Some(hook) = self.after_sleep.clone() {
                hook(self);
            }

            for j in 0..numevents {
                // A callback may have re-entered the loop and repolled.
                if j >= self.fired.len() {
                    break;
                }
                let Fired { fd, mask } = self.fired[j];
                let slot = fd as usize;
                if slot >= self.setsize {
                    continue;
                }

                // Re-check the slot before each call: an earlier callback
                // in this batch may have removed or reconfigured it.
                let read = {
                    let fe = &self.events[slot];
                    if (fe.mask & mask).is_readable() {
                        fe.rproc.clone().zip(fe.data.clone())
                    } else {
                        None
                    }
                };
                let rfired = read.is_some();
                if let Some((proc, data)) = read {
                    proc(self, fd, &data, mask);
                }

                let write = {
                    let fe = &self.events[slot];
                    if (fe.mask & mask).is_writable() {
                        match (&fe.rproc, &fe.wproc) {
                            // One handler serving both directions already
                            // ran on the read pass.
                            (Some(r), Some(w)) if rfired && Rc::ptr_eq(r, w) => None,
                            (_, Some(w)) => Some(w.clone()).zip(fe.data.clone()),
                            (_, None) => None,
                        }
                    } else {
                        None
                    }
                };
                if let Some((proc, data)) = write {
                    proc(self, fd, &data, mask);
                }

                processed += 1;
            }
        }

        if flags.contains(Flags::TIME) {
            processed += self.process_time_events();
        }
        processed
    }

    /// Drive [`EventLoop::process_events`] until [`EventLoop::stop`] is
    /// called, running the before-sleep hook at the top of every
    /// iteration.
    pub fn run(&mut self) {
        self.stop = false;
        while !self.stop {
            if let Some(hook) = self.before_sleep.clone() {
                hook(self);
            }
            self.process_events(Flags::ALL);
        }
    }

    /// Ask the loop to return from [`EventLoop::run`] once the current
    /// iteration completes.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    fn timer_node(&self, id: TimerId) -> Option<NodeId> {
        let mut cur = self.timers.head();
        while let Some(node) = cur {
            if self.timers.value(node).id == id {
                return Some(node);
            }
            cur = self.timers.next_node(node);
        }
        None
    }

    /// Delta to the earliest pending timer, clamped at zero; `None` when
    /// no timer is pending.
    fn nearest_timer_delay(&self) -> Option<Duration> {
        let mut nearest: Option<(i64, i64)> = None;
        for te in self.timers.iter() {
            let when = (te.when_sec, te.when_ms);
            if nearest.map_or(true, |n| when < n) {
                nearest = Some(when);
            }
        }
        nearest.map(|(sec, ms)| {
            let (now_sec, now_ms) = current_time();
            let mut d_sec = sec - now_sec;
            let mut d_ms = ms - now_ms;
            if d_ms < 0 {
                d_sec -= 1;
                d_ms += 1000;
            }
            if d_sec < 0 {
                // The clock moved under us; come back immediately.
                Duration::ZERO
            } else {
                Duration::from_millis((d_sec * 1000 + d_ms) as u64)
            }
        })
    }

    /// One firing pass over the timer list.
    fn process_time_events(&mut self) -> usize {
        let mut processed = 0;
        let (now_sec, _) = current_time();

        // A clock jumped backwards delays unsorted timers at random;
        // firing everything early is the lesser risk, so make every
        // pending timer ripe.
        if now_sec < self.last_time {
            warn!("system clock moved backwards; firing all pending timers");
            let mut it = self.timers.cursor(Direction::Head);
            while let Some(node) = it.next(&self.timers) {
                self.timers.value_mut(node).when_sec = 0;
            }
        }
        self.last_time = now_sec;

        let max_id = self.time_next_id - 1;
        let mut it = self.timers.cursor(Direction::Head);
        while let Some(node) = it.next(&self.timers) {
            let (id, when_sec, when_ms, proc, data) = {
                let te = self.timers.value(node);
                (
                    te.id,
                    te.when_sec,
                    te.when_ms,
                    te.proc.clone(),
                    te.data.clone(),
                )
            };

            // Timers created by callbacks during this pass wait for the
            // next one; a callback arming an immediate timer must not
            // keep the pass spinning.
            if id > max_id {
                continue;
            }

            let (now_sec, now_ms) = current_time();
            if now_sec > when_sec || (now_sec == when_sec && now_ms >= when_ms) {
                let action = proc(self, id, &data);
                processed += 1;
                match action {
                    TimeAction::Again(ms) => {
                        // The callback may have deleted its own timer, in
                        // which case the deletion wins.
                        if let Some(node) = self.timer_node(id) {
                            let (sec, ms) = add_millis_to_now(ms);
                            let te = self.timers.value_mut(node);
                            te.when_sec = sec;
                            te.when_ms = ms;
                        }
                    }
                    TimeAction::Done => {
                        let _ = self.del_time_event(id);
                    }
                }
                // The callback may have reshaped the list; start over.
                it.rewind(&self.timers);
            }
        }
        processed
    }
}

/// Block the current thread on a single descriptor, independent of any
/// loop, for up to `milliseconds` (negative blocks indefinitely).
///
/// Returns the directions that became available; error and hangup
/// conditions surface as `WRITABLE`. A timeout returns `Mask::NONE`.
pub fn wait(fd: RawFd, mask: Mask, milliseconds: i64) -> io::Result<Mask> {
    sys_wait(fd, mask, milliseconds)
}
