//! A reusable rendezvous point delimiting the phases of a simulation.
//!
//! This is a centralized sense-reversing barrier. Every participant increments a shared counter;
//! the last one to arrive runs the round's action, resets the counter, advances the round seed and
//! flips the sense flag, which releases everyone else. Waiters back off with randomized,
//! exponentially growing delays while the sense has not flipped yet.
//!
//! Once the run is aborted, nobody arrives or waits anymore: every participant still at the
//! barrier fails with [Error::RunAborted].

use tracing::{debug, instrument, trace};

use crate::backoff::{Backoff, BackoffConfig};
use crate::err::Error;
use crate::run::RunState;
use crate::sync::{Arc, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use crate::types::{check_processor_id, ProcessorId, Seed};

/// Returned by the `synchronize` family once every participant has arrived.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BarrierWaitResult(bool);

impl BarrierWaitResult {
    /// Whether this participant arrived last and therefore ran the round's action.
    pub fn is_leader(&self) -> bool {
        self.0
    }
}

#[derive(Debug)]
pub struct PhaseBarrier {
    num_participants: usize,
    config: BackoffConfig,
    /// How many participants arrived at the current round so far.
    count: AtomicUsize,
    /// Flips every completed round.
    sense: AtomicBool,
    seed: AtomicU64,
    rounds_completed: AtomicU64,
    run: Arc<RunState>,
}

impl PhaseBarrier {
    /// A barrier for `num_participants` participants with processor ids `0..num_participants`.
    ///
    /// The barrier only learns about aborted runs from its own participants. Prefer
    /// [crate::Memory::phase_barrier], which also stops waiting on violations raised by cells.
    ///
    /// # Panics
    ///
    /// If `num_participants` is 0.
    pub fn new(num_participants: usize) -> Self {
        Self::with_config(num_participants, BackoffConfig::default())
    }

    /// # Panics
    ///
    /// If `num_participants` is 0.
    pub fn with_config(num_participants: usize, config: BackoffConfig) -> Self {
        Self::for_run(num_participants, config, Arc::new(RunState::new()))
    }

    pub(crate) fn for_run(
        num_participants: usize,
        config: BackoffConfig,
        run: Arc<RunState>,
    ) -> Self {
        assert!(num_participants > 0, "a barrier needs at least one participant");
        Self {
            num_participants,
            config,
            count: AtomicUsize::new(0),
            sense: AtomicBool::new(false),
            seed: AtomicU64::new(config.initial_seed),
            rounds_completed: AtomicU64::new(0),
            run,
        }
    }

    pub fn num_participants(&self) -> usize {
        self.num_participants
    }

    /// The number of rounds completed so far.
    pub fn round(&self) -> u64 {
        self.rounds_completed.load(Ordering::Acquire)
    }

    /// Release every current and future waiter with [Error::RunAborted].
    pub(crate) fn abort_run(&self) {
        self.run.abort();
    }

    /// Wait until all participants have arrived.
    ///
    /// # Panics
    ///
    /// If `processor` is out of range or the run was aborted.
    #[track_caller]
    pub fn synchronize(&self, processor: ProcessorId) -> BarrierWaitResult {
        self.synchronize_with_action(processor, || {})
    }

    /// Wait until all participants have arrived. The last one to arrive runs `action` before
    /// anyone is released; everyone else drops theirs.
    ///
    /// # Panics
    ///
    /// If `processor` is out of range or the run was aborted.
    #[track_caller]
    pub fn synchronize_with_action<F>(&self, processor: ProcessorId, action: F) -> BarrierWaitResult
    where
        F: FnOnce(),
    {
        match self.try_synchronize_with_action(processor, action) {
            Ok(result) => result,
            Err(error) => self.run.fail(error),
        }
    }

    /// Like [PhaseBarrier::synchronize_with_action], but reports an out-of-range processor id or
    /// an aborted run instead of panicking. An out-of-range processor does not arrive.
    #[instrument(level = "trace", skip(self, action))]
    pub fn try_synchronize_with_action<F>(
        &self,
        processor: ProcessorId,
        action: F,
    ) -> Result<BarrierWaitResult, Error>
    where
        F: FnOnce(),
    {
        check_processor_id(processor, self.num_participants)?;
        if self.run.is_aborted() {
            return Err(Error::RunAborted { processor });
        }

        // both are only changed by the previous round's leader, before it released us
        let round_seed: Seed = self.seed.load(Ordering::Acquire);
        let release_sense: bool = !self.sense.load(Ordering::Acquire);

        let arrived: usize = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == self.num_participants {
            action();
            self.seed.store(round_seed.wrapping_add(1), Ordering::Release);
            let round: u64 = self.rounds_completed.fetch_add(1, Ordering::AcqRel) + 1;
            // the counter must be reset before anyone can arrive at the next round
            self.count.store(0, Ordering::Release);
            self.sense.store(release_sense, Ordering::Release);
            debug!(round, leader = processor, "round complete");
            return Ok(BarrierWaitResult(true));
        }

        let mut backoff: Backoff =
            Backoff::new(processor, self.num_participants, round_seed, &self.config);
        let mut retries: u64 = 0;
        while self.sense.load(Ordering::Acquire) != release_sense {
            if self.run.is_aborted() {
                debug!(processor, retries, "run aborted while waiting");
                return Err(Error::RunAborted { processor });
            }
            backoff.snooze();
            retries += 1;
        }
        trace!(retries, "released");
        Ok(BarrierWaitResult(false))
    }
}
