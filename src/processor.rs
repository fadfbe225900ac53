use displaydoc::Display;
use tracing::{error, instrument};

use crate::cell::Cell;
use crate::err::{Error, NoProcessorAvailableError};
use crate::memory::Memory;
use crate::phase_barrier::{BarrierWaitResult, PhaseBarrier};
use crate::types::ProcessorId;

#[derive(Debug, Display, Clone, Copy, Eq, PartialEq)]
pub enum ProcessorError {
    /** Could not construct a [Processor] because all processor ids of the provided [Memory] are
       already in use.
    */
    NoProcessorAvailable(NoProcessorAvailableError),

    /// The memory has {memory} processors but the barrier expects {barrier} participants.
    ParticipantCountMismatch { memory: usize, barrier: usize },
}

impl std::error::Error for ProcessorError {}

impl From<NoProcessorAvailableError> for ProcessorError {
    fn from(error: NoProcessorAvailableError) -> Self {
        Self::NoProcessorAvailable(error)
    }
}

/// One logical processor of a simulation, holding a processor id for as long as it lives.
///
/// A `Processor` bundles the id with the [Memory] and [PhaseBarrier] it works against, so that a
/// round reads as plain cell accesses followed by [Processor::end_phase]. The id is released when
/// the `Processor` is dropped. A `Processor` dropped while its thread panics aborts the run, so the
/// other processors stop waiting for it at the barrier.
#[derive(Debug)]
pub struct Processor<'a> {
    memory: &'a Memory,
    barrier: &'a PhaseBarrier,
    id: ProcessorId,
}

impl<'a> Processor<'a> {
    pub fn construct(
        memory: &'a Memory,
        barrier: &'a PhaseBarrier,
    ) -> Result<Self, ProcessorError> {
        if memory.num_processors() != barrier.num_participants() {
            return Err(ProcessorError::ParticipantCountMismatch {
                memory: memory.num_processors(),
                barrier: barrier.num_participants(),
            });
        }
        let id: ProcessorId = memory
            .claim_processor_id()
            .ok_or(NoProcessorAvailableError)?;
        Ok(Self {
            memory,
            barrier,
            id,
        })
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn memory(&self) -> &'a Memory {
        self.memory
    }

    pub fn try_read<T: Clone + Send + 'static>(&self, cell: &Cell<T>) -> Result<T, Error> {
        cell.try_read(self.id)
    }

    /// # Panics
    ///
    /// On a protocol violation.
    #[track_caller]
    pub fn read<T: Clone + Send + 'static>(&self, cell: &Cell<T>) -> T {
        cell.read(self.id)
    }

    pub fn try_write<T>(&self, cell: &Cell<T>, value: T) -> Result<(), Error>
    where
        T: Clone + Send + 'static,
    {
        cell.try_write(self.id, value)
    }

    /// # Panics
    ///
    /// On a protocol violation.
    #[track_caller]
    pub fn write<T: Clone + Send + 'static>(&self, cell: &Cell<T>, value: T) {
        cell.write(self.id, value)
    }

    /// Finish this processor's phase: run its barrier pass, then wait for every other processor.
    #[instrument(level = "debug", skip(self), fields(processor = self.id))]
    pub fn end_phase(&self) -> BarrierWaitResult {
        self.memory.barrier_pass(self.id);
        self.barrier.synchronize(self.id)
    }

    /// Like [Processor::end_phase], but the last processor to arrive runs `action` before anyone
    /// starts the next phase.
    #[instrument(level = "debug", skip(self, action), fields(processor = self.id))]
    pub fn end_phase_with_action<F: FnOnce()>(&self, action: F) -> BarrierWaitResult {
        self.memory.barrier_pass(self.id);
        self.barrier.synchronize_with_action(self.id, action)
    }
}

impl<'a> Drop for Processor<'a> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(processor = self.id, "processor panicked, aborting the run");
            self.memory.abort_run();
            self.barrier.abort_run();
        }
        self.memory.release_processor_id(self.id);
    }
}

#[cfg(all(test, not(feature = "shuttle"), not(loom)))]
mod tests {
    use crate::cell::Cell;
    use crate::memory::Memory;
    use crate::phase_barrier::PhaseBarrier;
    use crate::processor::{Processor, ProcessorError};
    use std::any::Any;
    use std::thread;
    use test_log::test;

    #[test]
    fn test_processor_id_reservation() {
        let memory: Memory = Memory::new(3);
        let barrier: PhaseBarrier = PhaseBarrier::new(3);

        let first: Processor = Processor::construct(&memory, &barrier).unwrap();
        assert_eq!(first.id(), 0);
        {
            let second: Processor = Processor::construct(&memory, &barrier).unwrap();
            assert_eq!(second.id(), 1);
        }
        // the second processor has been dropped - id 1 should be available again
        let second: Processor = Processor::construct(&memory, &barrier).unwrap();
        assert_eq!(second.id(), 1);

        let third: Processor = Processor::construct(&memory, &barrier).unwrap();
        assert_eq!(third.id(), 2);

        // now there should be no ids left
        let result: Result<Processor, ProcessorError> = Processor::construct(&memory, &barrier);
        assert!(matches!(
            result.unwrap_err(),
            ProcessorError::NoProcessorAvailable(_)
        ));
    }

    #[test]
    fn test_mismatched_participant_count() {
        let memory: Memory = Memory::new(3);
        let barrier: PhaseBarrier = PhaseBarrier::new(2);
        assert_eq!(
            Processor::construct(&memory, &barrier).unwrap_err(),
            ProcessorError::ParticipantCountMismatch {
                memory: 3,
                barrier: 2
            }
        );
    }

    #[test]
    fn test_race_has_single_winner_across_rounds() {
        const PROCESSORS: usize = 4;
        const ROUNDS: usize = 20;
        let memory: Memory = Memory::new(PROCESSORS);
        let barrier: PhaseBarrier = PhaseBarrier::new(PROCESSORS);
        let slot: Cell<Option<usize>> = memory.named_cell("slot");
        let winners: Cell<Vec<usize>> = memory.named_cell("winners");

        thread::scope(|scope| {
            for _ in 0..PROCESSORS {
                let processor: Processor = Processor::construct(&memory, &barrier).unwrap();
                let slot: &Cell<Option<usize>> = &slot;
                let winners: &Cell<Vec<usize>> = &winners;
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        // everyone races for the slot
                        processor.write(slot, Some(processor.id()));
                        processor.end_phase();

                        // everyone agrees on the committed winner
                        let winner: Option<usize> = processor.read(slot);
                        assert!(winner.is_some());
                        processor.end_phase();

                        if processor.id() == 0 {
                            let mut history: Vec<usize> = processor.read(winners);
                            assert_eq!(history.len(), round);
                            history.extend(winner);
                            processor.write(winners, history);
                        }
                        processor.end_phase();
                    }
                });
            }
        });

        let history: Vec<usize> = winners.peek();
        assert_eq!(history.len(), ROUNDS);
        assert!(history.iter().all(|winner| *winner < PROCESSORS));
    }

    fn panic_message(payload: Box<dyn Any + Send>) -> String {
        payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|message| message.to_string()))
            .unwrap_or_default()
    }

    #[test]
    fn test_violation_ends_the_run_for_waiting_processors() {
        let memory: Memory = Memory::new(2);
        let barrier: PhaseBarrier = memory.phase_barrier();
        let cell: Cell<usize> = memory.named_cell("contested");

        thread::scope(|scope| {
            let first: Processor = Processor::construct(&memory, &barrier).unwrap();
            let second: Processor = Processor::construct(&memory, &barrier).unwrap();
            first.write(&cell, 0);
            second.write(&cell, 1);

            let waiter = scope.spawn(move || first.end_phase());
            // the loser reads before the barrier resolved the race
            let violator = scope.spawn(move || second.read(&cell));

            let violation: String = panic_message(violator.join().unwrap_err());
            assert!(violation.contains("read a cell it raced on"), "{violation}");
            let released: String = panic_message(waiter.join().unwrap_err());
            assert!(released.contains("another processor ended the run"), "{released}");
        });
    }

    #[test]
    fn test_panicking_processor_releases_standalone_barrier() {
        let memory: Memory = Memory::new(2);
        let barrier: PhaseBarrier = PhaseBarrier::new(2);

        thread::scope(|scope| {
            let first: Processor = Processor::construct(&memory, &barrier).unwrap();
            let second: Processor = Processor::construct(&memory, &barrier).unwrap();

            let waiter = scope.spawn(move || first.end_phase());
            let crashing = scope.spawn(move || {
                let _second: Processor = second;
                panic!("worker crashed");
            });

            assert!(crashing.join().is_err());
            let released: String = panic_message(waiter.join().unwrap_err());
            assert!(released.contains("another processor ended the run"), "{released}");
        });
        // both ids were given back
        assert!(Processor::construct(&memory, &barrier).is_ok());
    }
}
