//! Event types shared between the loop core and the pollers.
//!
//! A registration's interest and a poller's readiness report are both a
//! [`Mask`], so the dispatch code can intersect them directly. [`Flags`]
//! selects what a single tick of the loop is allowed to process.

use std::any::Any;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::os::fd::RawFd;
use std::rc::Rc;

use crate::core::EventLoop;

/// A set of readiness directions.
///
/// `NONE` doubles as the "unregistered" sentinel in the file-event table:
/// a slot is registered iff its mask is not `NONE`.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Mask(u8);

impl Mask {
    pub const NONE: Mask = Mask(0);
    pub const READABLE: Mask = Mask(1);
    pub const WRITABLE: Mask = Mask(2);

    /// Whether every direction in `other` is present in `self`.
    pub const fn contains(self, other: Mask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether `self` and `other` share at least one direction.
    pub const fn intersects(self, other: Mask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn is_readable(self) -> bool {
        self.intersects(Mask::READABLE)
    }

    pub const fn is_writable(self) -> bool {
        self.intersects(Mask::WRITABLE)
    }
}

impl BitOr for Mask {
    type Output = Mask;

    fn bitor(self, rhs: Mask) -> Mask {
        Mask(self.0 | rhs.0)
    }
}

impl BitOrAssign for Mask {
    fn bitor_assign(&mut self, rhs: Mask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Mask {
    type Output = Mask;

    fn bitand(self, rhs: Mask) -> Mask {
        Mask(self.0 & rhs.0)
    }
}

impl Not for Mask {
    type Output = Mask;

    fn not(self) -> Mask {
        Mask(!self.0 & (Mask::READABLE.0 | Mask::WRITABLE.0))
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (false, false) => f.write_str("NONE"),
            (true, false) => f.write_str("READABLE"),
            (false, true) => f.write_str("WRITABLE"),
            (true, true) => f.write_str("READABLE|WRITABLE"),
        }
    }
}

/// What a single call to [`EventLoop::process_events`] may process.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Flags(u8);

impl Flags {
    /// Dispatch ready file descriptors.
    pub const FILE: Flags = Flags(1);
    /// Fire ripe timers.
    pub const TIME: Flags = Flags(2);
    /// Both kinds of work.
    pub const ALL: Flags = Flags(3);
    /// Never block in the poller, even if nothing is ready.
    pub const DONT_WAIT: Flags = Flags(4);

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// One descriptor the poller reported ready, with the directions that
/// became ready. Entries are only meaningful between the return of one
/// poll and the start of the next.
#[derive(Clone, Copy)]
pub(crate) struct Fired {
    pub(crate) fd: RawFd,
    pub(crate) mask: Mask,
}

/// Opaque user payload attached to a registration and handed back to its
/// callbacks. The loop keeps one strong reference and drops it at
/// deregistration; it never looks inside.
pub type ClientData = Rc<dyn Any>;

/// Callback invoked when a registered descriptor becomes ready.
///
/// Receives the loop itself, so it may freely register, unregister,
/// resize, arm timers, or stop from inside the tick. The mask argument is
/// the readiness actually reported, which may be wider than the direction
/// this callback was installed for.
pub type FileProc = Rc<dyn Fn(&mut EventLoop, RawFd, &ClientData, Mask)>;

/// Hook run by [`EventLoop::run`] around each tick.
pub type HookProc = Rc<dyn Fn(&mut EventLoop)>;
