use std::cell::Cell;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use tempo::{ClientData, Error, EventLoop, FileProc, Flags, Mask};

// These tests plant pipes on fixed descriptor numbers with dup2; run
// them one at a time so a concurrent test's fresh pipe cannot land on a
// number about to be clobbered.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn noop() -> FileProc {
    Rc::new(|_el: &mut EventLoop, _fd, _data: &ClientData, _mask| {})
}

/// Open a pipe with its read end planted exactly on descriptor `target`;
/// returns `(target, write_end)`.
fn pipe_read_end_at(target: RawFd) -> (RawFd, RawFd) {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe(2) failed");
    let rc = unsafe { libc::dup2(fds[0], target) };
    assert!(rc >= 0, "dup2(2) failed");
    unsafe { libc::close(fds[0]) };
    (target, fds[1])
}

#[test]
fn resize_rules() {
    let _guard = serial();
    let mut el = EventLoop::new(16).unwrap();
    let (fd, _w) = pipe_read_end_at(15);
    el.add_file_event(fd, Mask::READABLE, noop(), Rc::new(())).unwrap();

    // Unchanged size is accepted without doing anything.
    el.resize_setsize(16).unwrap();
    assert_eq!(el.setsize(), 16);

    // Shrinking below the registered maximum is refused and leaves the
    // tables as they were.
    let err = el.resize_setsize(10).unwrap_err();
    assert!(matches!(err, Error::Shrink { requested: 10, maxfd: 15 }));
    assert_eq!(el.setsize(), 16);
    assert_eq!(el.file_events(15), Mask::READABLE);

    // Growing preserves the registration.
    el.resize_setsize(64).unwrap();
    assert_eq!(el.setsize(), 64);
    assert_eq!(el.file_events(15), Mask::READABLE);
    assert_eq!(el.max_fd(), 15);
}

#[test]
fn grown_table_accepts_previously_rejected_descriptors() {
    let _guard = serial();
    let mut el = EventLoop::new(4).unwrap();
    let (fd, _w) = pipe_read_end_at(9);

    assert!(matches!(
        el.add_file_event(fd, Mask::READABLE, noop(), Rc::new(())),
        Err(Error::Range { .. })
    ));

    el.resize_setsize(16).unwrap();
    el.add_file_event(fd, Mask::READABLE, noop(), Rc::new(())).unwrap();
    assert_eq!(el.max_fd(), 9);
}

#[test]
fn shrinking_after_deregistration_is_allowed() {
    let _guard = serial();
    let mut el = EventLoop::new(32).unwrap();
    let (fd, _w) = pipe_read_end_at(20);

    el.add_file_event(fd, Mask::READABLE, noop(), Rc::new(())).unwrap();
    assert!(el.resize_setsize(8).is_err());

    el.del_file_event(fd, Mask::READABLE);
    el.resize_setsize(8).unwrap();
    assert_eq!(el.setsize(), 8);
    assert_eq!(el.max_fd(), -1);
}

#[test]
fn registrations_still_dispatch_after_a_grow() {
    let _guard = serial();
    let mut el = EventLoop::new(16).unwrap();
    let (fd, w) = pipe_read_end_at(12);

    let hits = Rc::new(Cell::new(0));
    let hits_cb = hits.clone();
    el.add_file_event(
        fd,
        Mask::READABLE,
        Rc::new(move |_el: &mut EventLoop, fd, _data, _mask| {
            let mut byte = 0u8;
            unsafe { libc::read(fd, &mut byte as *mut u8 as *mut _, 1) };
            hits_cb.set(hits_cb.get() + 1);
        }),
        Rc::new(()),
    )
    .unwrap();

    el.resize_setsize(128).unwrap();

    let byte = b'z';
    let rc = unsafe { libc::write(w, &byte as *const u8 as *const _, 1) };
    assert_eq!(rc, 1);

    el.process_events(Flags::FILE | Flags::DONT_WAIT);
    assert_eq!(hits.get(), 1, "the reallocated slot still dispatches");
}
