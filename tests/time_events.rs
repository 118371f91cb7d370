use std::cell::Cell;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tempo::{ClientData, Error, EventLoop, Flags, Mask, TimeAction};

fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe(2) failed");
    (fds[0], fds[1])
}

fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

/// Registers an always-ready write-end watchdog that stops the loop once
/// `deadline` has elapsed, so `run()` terminates without timer help.
fn arm_watchdog(el: &mut EventLoop, fd: RawFd, deadline: Duration) {
    let started = Instant::now();
    el.add_file_event(
        fd,
        Mask::WRITABLE,
        Rc::new(move |el: &mut EventLoop, _fd, _data, _mask| {
            if started.elapsed() >= deadline {
                el.stop();
            }
        }),
        Rc::new(()),
    )
    .unwrap();
}

#[test]
fn one_shot_timer_fires_exactly_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (r, w) = pipe();
    let mut el = EventLoop::new(8).unwrap();
    arm_watchdog(&mut el, w, Duration::from_millis(200));

    let fired = Rc::new(Cell::new(0));
    let fired_cb = fired.clone();
    el.add_time_event(
        50,
        Rc::new(move |_el: &mut EventLoop, _id, _data: &ClientData| {
            fired_cb.set(fired_cb.get() + 1);
            TimeAction::Done
        }),
        Rc::new(()),
        None,
    );

    el.run();

    assert_eq!(fired.get(), 1);
    assert_eq!(el.timer_count(), 0, "one-shot timer removed after firing");
    close(r);
    close(w);
}

#[test]
fn periodic_timer_keeps_rescheduling() {
    let (r, w) = pipe();
    let mut el = EventLoop::new(8).unwrap();
    arm_watchdog(&mut el, w, Duration::from_millis(105));

    let fired = Rc::new(Cell::new(0));
    let fired_cb = fired.clone();
    el.add_time_event(
        10,
        Rc::new(move |_el: &mut EventLoop, _id, _data: &ClientData| {
            fired_cb.set(fired_cb.get() + 1);
            TimeAction::Again(10)
        }),
        Rc::new(()),
        None,
    );

    el.run();

    let count = fired.get();
    assert!(
        (3..=12).contains(&count),
        "a 10ms periodic timer fired {count} times in ~105ms"
    );
    assert_eq!(el.timer_count(), 1, "periodic timer survives the run");
    close(r);
    close(w);
}

#[test]
fn timer_ids_are_dense_and_increasing() {
    fn noop(_el: &mut EventLoop, _id: tempo::TimerId, _data: &ClientData) -> TimeAction {
        TimeAction::Done
    }

    let mut el = EventLoop::new(8).unwrap();
    let a = el.add_time_event(10_000, Rc::new(noop), Rc::new(()), None);
    let b = el.add_time_event(10_000, Rc::new(noop), Rc::new(()), None);
    let c = el.add_time_event(10_000, Rc::new(noop), Rc::new(()), None);
    assert_eq!((a, b, c), (0, 1, 2));

    // Deleting never recycles an identifier.
    el.del_time_event(b).unwrap();
    let d = el.add_time_event(10_000, Rc::new(noop), Rc::new(()), None);
    assert_eq!(d, 3);
}

#[test]
fn timer_armed_by_a_callback_waits_for_the_next_tick() {
    let mut el = EventLoop::new(8).unwrap();

    let inner_fired = Rc::new(Cell::new(false));
    let inner_flag = inner_fired.clone();
    el.add_time_event(
        0,
        Rc::new(move |el: &mut EventLoop, _id, _data: &ClientData| {
            let inner_flag = inner_flag.clone();
            el.add_time_event(
                0,
                Rc::new(move |_el: &mut EventLoop, _id, _data: &ClientData| {
                    inner_flag.set(true);
                    TimeAction::Done
                }),
                Rc::new(()),
                None,
            );
            TimeAction::Done
        }),
        Rc::new(()),
        None,
    );

    el.process_events(Flags::TIME | Flags::DONT_WAIT);
    assert!(!inner_fired.get(), "nested timer deferred to the next pass");
    assert_eq!(el.timer_count(), 1);

    std::thread::sleep(Duration::from_millis(2));
    el.process_events(Flags::TIME | Flags::DONT_WAIT);
    assert!(inner_fired.get());
    assert_eq!(el.timer_count(), 0);
}

#[test]
fn deletion_runs_the_finalizer() {
    let mut el = EventLoop::new(8).unwrap();

    let finalized = Rc::new(Cell::new(false));
    let flag = finalized.clone();
    let id = el.add_time_event(
        10_000,
        Rc::new(|_el: &mut EventLoop, _id, _data: &ClientData| TimeAction::Done),
        Rc::new(7i32),
        Some(Rc::new(move |_el: &mut EventLoop, data: &ClientData| {
            assert_eq!(data.downcast_ref::<i32>(), Some(&7));
            flag.set(true);
        })),
    );

    el.del_time_event(id).unwrap();
    assert!(finalized.get());

    let err = el.del_time_event(id).unwrap_err();
    assert!(matches!(err, Error::TimerNotFound(_)));
}

#[test]
fn one_shot_completion_runs_the_finalizer() {
    let mut el = EventLoop::new(8).unwrap();

    let finalized = Rc::new(Cell::new(false));
    let flag = finalized.clone();
    el.add_time_event(
        0,
        Rc::new(|_el: &mut EventLoop, _id, _data: &ClientData| TimeAction::Done),
        Rc::new(()),
        Some(Rc::new(move |_el: &mut EventLoop, _data: &ClientData| {
            flag.set(true)
        })),
    );

    std::thread::sleep(Duration::from_millis(2));
    el.process_events(Flags::TIME | Flags::DONT_WAIT);
    assert!(finalized.get());
    assert_eq!(el.timer_count(), 0);
}

#[test]
fn periodic_callback_deleting_itself_wins() {
    let mut el = EventLoop::new(8).unwrap();

    el.add_time_event(
        0,
        Rc::new(|el: &mut EventLoop, id, _data: &ClientData| {
            el.del_time_event(id).unwrap();
            // Asking to be rearmed after self-deletion must not revive it.
            TimeAction::Again(0)
        }),
        Rc::new(()),
        None,
    );

    std::thread::sleep(Duration::from_millis(2));
    el.process_events(Flags::TIME | Flags::DONT_WAIT);
    assert_eq!(el.timer_count(), 0);
}

#[test]
fn poll_sleep_is_bounded_by_the_nearest_timer() {
    let mut el = EventLoop::new(8).unwrap();

    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    el.add_time_event(
        30,
        Rc::new(move |_el: &mut EventLoop, _id, _data: &ClientData| {
            flag.set(true);
            TimeAction::Done
        }),
        Rc::new(()),
        None,
    );

    // No descriptor registered: the poll timeout alone must wake us.
    el.process_events(Flags::ALL);
    assert!(fired.get(), "a single blocking tick serviced the timer");
}

#[test]
fn dont_wait_never_blocks() {
    let mut el = EventLoop::new(8).unwrap();
    el.add_time_event(
        60_000,
        Rc::new(|_el: &mut EventLoop, _id, _data: &ClientData| TimeAction::Done),
        Rc::new(()),
        None,
    );

    let started = Instant::now();
    el.process_events(Flags::ALL | Flags::DONT_WAIT);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(el.timer_count(), 1);
}
