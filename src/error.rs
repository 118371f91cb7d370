//! Library error type.

use std::io;
use std::os::fd::RawFd;

use crate::timer::TimerId;

/// Everything that can go wrong at the library surface.
///
/// All failures are reported as values; the loop never panics on user
/// input and never unwinds out of a callback on its own behalf.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The descriptor does not fit the registration table.
    #[error("descriptor {fd} outside registration table (setsize {setsize})")]
    Range { fd: RawFd, setsize: usize },

    /// A resize would orphan an already-registered descriptor.
    #[error("setsize {requested} not above largest registered descriptor {maxfd}")]
    Shrink { requested: usize, maxfd: RawFd },

    /// No pending timer carries this identifier.
    #[error("no timer with id {0}")]
    TimerNotFound(TimerId),

    /// The kernel refused a subscription or the backend could not be set up.
    #[error("readiness backend: {0}")]
    Backend(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
