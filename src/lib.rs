//! # Tempo
//!
//! **Tempo** is a single-threaded, reactor-style event loop: it
//! multiplexes level-triggered I/O readiness over a set of kernel file
//! descriptors together with millisecond wall-clock timers, and invokes
//! user-supplied callbacks when either becomes ready. It is the
//! concurrency core a networked server is built on: register
//! descriptors and timers, then hand control to [`EventLoop::run`],
//! which blocks in the kernel's readiness primitive until work appears.
//!
//! The kernel primitive is chosen at compile time, best first: event
//! ports on Solaris/illumos, `epoll` on Linux, `kqueue` on macOS and
//! the BSDs, `select` everywhere else. All four present identical
//! semantics; [`api_name`] tells you which one a build carries.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::rc::Rc;
//! use tempo::{EventLoop, Mask};
//!
//! let mut el = EventLoop::new(1024).expect("event loop");
//!
//! let fd = 0; // some non-blocking descriptor you own
//! el.add_file_event(
//!     fd,
//!     Mask::READABLE,
//!     Rc::new(|el, fd, _data, _mask| {
//!         // consume the readiness, then perhaps el.stop()
//!         let _ = (el, fd);
//!     }),
//!     Rc::new(()),
//! )
//! .expect("register");
//!
//! el.run();
//! ```
//!
//! ## Model
//!
//! Everything happens on the calling thread. Callbacks receive
//! `&mut EventLoop` and may register, unregister, resize, arm or delete
//! timers, and stop the loop; the only blocking point is the kernel
//! poll, bounded by the nearest pending timer. Timers scheduled from
//! within a timer callback are deferred to the next tick. The loop
//! never closes a descriptor: closing is its owner's duty, after
//! unregistering it.
//!
//! ## Modules
//!
//! - [`list`] — the generic doubly linked list used for the loop's
//!   unordered collections, exported for embedding applications

mod core;
mod error;
mod event;
mod poller;
mod timer;

pub mod list;

pub use crate::core::{wait, EventLoop};
pub use error::{Error, Result};
pub use event::{ClientData, FileProc, Flags, HookProc, Mask};
pub use poller::api_name;
pub use timer::{FinalizerProc, TimeAction, TimeProc, TimerId};
