use crate::state::{DirectoryState, ProcessorState};
use crate::types::{CellId, ProcessorId};
use displaydoc::Display;

/// Any error which can occur while operating on the simulated memory.
#[derive(Debug, Display, Clone, Eq, PartialEq)]
pub enum Error {
    /// Protocol violation, the run cannot continue: {0}
    Violation(ProtocolViolation),

    /// Processor id {processor} is out of range for a simulation with {num_processors} processors.
    ProcessorOutOfRange {
        processor: ProcessorId,
        num_processors: usize,
    },

    /// Processor {processor} gave up waiting at the barrier as another processor ended the run.
    RunAborted { processor: ProcessorId },
}

impl std::error::Error for Error {}

impl From<ProtocolViolation> for Error {
    fn from(violation: ProtocolViolation) -> Self {
        Error::Violation(violation)
    }
}

/// Processor {processor} {kind} on cell {cell} ({label}) with processor state {processor_state} and directory state {directory_state}
#[derive(Debug, Display, Clone, Eq, PartialEq)]
pub struct ProtocolViolation {
    pub kind: ViolationKind,
    pub processor: ProcessorId,
    pub cell: CellId,
    pub label: String,
    pub processor_state: ProcessorState,
    pub directory_state: DirectoryState,
}

/// The illegal (processor state, directory state) combinations an operation can run into.
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq)]
pub enum ViolationKind {
    /// read a cell it raced on before the phase's barrier resolved the race
    ReadDuringOwnRace,
    /// read a cell another processor holds an uncommitted write on
    ReadOfDirtyCell,
    /// read a cell with an unresolved race pending
    ReadOfRacedCell,
    /// wrote a cell it only holds a shared read-only copy of
    WriteWhileShared,
    /// wrote a cell it holds a stale copy of although no processor holds the cell
    StaleCopyOfUntrackedCell,
}

/// All processor ids of this simulation are already held by a [crate::Processor].
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq)]
pub struct NoProcessorAvailableError;

impl std::error::Error for NoProcessorAvailableError {}

/// Abort the run on an error the protocol cannot recover from.
#[track_caller]
pub(crate) fn fatal(error: Error) -> ! {
    tracing::error!(%error, "aborting run");
    panic!("{error}")
}
