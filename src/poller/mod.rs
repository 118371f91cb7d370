//! Platform-specific readiness backends.
//!
//! One backend struct per kernel primitive, all exposing the same
//! inherent surface to the loop core: `new`, `resize`, `add`, `del`,
//! `poll`, and an associated `NAME`. The concrete implementation is
//! chosen at compile time, best primitive first:
//!
//! 1. event ports (Solaris, illumos)
//! 2. `epoll` (Linux)
//! 3. `kqueue` (macOS, BSDs)
//! 4. `select` (everything else)
//!
//! Every backend presents level-triggered readiness, merges same-fd
//! reports into a single fired entry, folds error/hangup conditions into
//! writability, and absorbs poll-time interrupts as an empty result.

pub(crate) mod unix;

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
mod evport;

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
pub(crate) type Poller = evport::EvportPoller;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod kqueue;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub(crate) type Poller = kqueue::KqueuePoller;

#[cfg(not(any(
    target_os = "solaris",
    target_os = "illumos",
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
mod select;

#[cfg(not(any(
    target_os = "solaris",
    target_os = "illumos",
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
pub(crate) type Poller = select::SelectPoller;

/// Name of the readiness primitive compiled into this build.
pub fn api_name() -> &'static str {
    Poller::NAME
}
