//! The fate shared by every processor of one simulation.

use crate::err::{fatal, Error};
use crate::sync::{AtomicBool, Ordering};

/// Set once any processor of a run hits an error it cannot recover from.
///
/// A [crate::PhaseBarrier] sharing this state stops waiting for the missing processor and fails
/// every waiter as well, so one violation ends the whole run instead of stalling it.
#[derive(Debug)]
pub(crate) struct RunState {
    aborted: AtomicBool,
}

impl RunState {
    pub(crate) fn new() -> Self {
        Self {
            aborted: AtomicBool::new(false),
        }
    }

    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Mark the run as aborted, then panic with `error`.
    #[track_caller]
    pub(crate) fn fail(&self, error: Error) -> ! {
        self.abort();
        fatal(error)
    }
}
