//! Timer records and wall-clock arithmetic.
//!
//! Fire times are absolute wall-clock instants split into whole seconds
//! and a millisecond remainder, because the loop's backwards-skew
//! compensation works by zeroing the seconds of every pending timer.
//! `Instant` would be immune to clock adjustments, which is exactly the
//! property this module must not have.

use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::EventLoop;
use crate::event::ClientData;

/// Identifier of a pending timer. Dense, strictly increasing, never
/// reused within one loop's lifetime.
pub type TimerId = i64;

/// Verdict a timer callback returns about its own future.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimeAction {
    /// Fire again this many milliseconds after the moment it just fired.
    Again(i64),
    /// One-shot: delete the timer, running its finalizer.
    Done,
}

/// Callback invoked when a timer comes ripe.
pub type TimeProc = Rc<dyn Fn(&mut EventLoop, TimerId, &ClientData) -> TimeAction>;

/// Callback invoked when a timer is removed, whichever way that happens.
pub type FinalizerProc = Rc<dyn Fn(&mut EventLoop, &ClientData)>;

/// One pending timer. Lives in the loop's unsorted timer list.
pub(crate) struct TimeEvent {
    pub(crate) id: TimerId,
    /// Absolute fire time, whole seconds.
    pub(crate) when_sec: i64,
    /// Absolute fire time, millisecond remainder in `[0, 1000)`.
    pub(crate) when_ms: i64,
    pub(crate) proc: TimeProc,
    pub(crate) finalizer: Option<FinalizerProc>,
    pub(crate) data: ClientData,
}

/// Current wall time as `(seconds, milliseconds)`.
pub(crate) fn current_time() -> (i64, i64) {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_millis() as i64),
        // A clock set before the epoch reads as the epoch itself.
        Err(_) => (0, 0),
    }
}

/// Wall time `millis` milliseconds from now, carrying any overflow of
/// the millisecond field into the seconds so that `ms` stays in
/// `[0, 1000)` even for negative offsets.
pub(crate) fn add_millis_to_now(millis: i64) -> (i64, i64) {
    let (cur_sec, cur_ms) = current_time();
    let mut when_sec = cur_sec + millis / 1000;
    let mut when_ms = cur_ms + millis % 1000;
    if when_ms >= 1000 {
        when_sec += 1;
        when_ms -= 1000;
    } else if when_ms < 0 {
        when_sec -= 1;
        when_ms += 1000;
    }
    (when_sec, when_ms)
}
