use core::fmt::{Display, Formatter};

/// The global ownership status of a cell, independent of any one processor's view.
///
/// `Invalid` can transition to `Clean` (first read) or `Dirty` (first write).
/// `Clean` can transition to `Valid` (a second reader) or `Winner` (a contending writer).
/// `Dirty` can transition to `Winner` (a contending writer) or `Clean` (the owner's barrier).
/// `Winner` can transition to `Valid` at the owner's barrier.
/// `Valid` can transition to `Dirty` when a writer is granted exclusive rights.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DirectoryState {
    /// A single processor owns the cell and has written to it during the current phase.
    Dirty,
    /// A single processor owns the cell but has not written to it during the current phase.
    Clean,
    /// A write-write race was decided during the current phase. The owner is the winner.
    Winner,
    /// Any number of processors share the cell read-only. There is no owner.
    Valid,
    /// Nobody holds the cell.
    Invalid,
}

impl DirectoryState {
    /// Whether the directory tracks a single owner in this state.
    pub fn has_owner(&self) -> bool {
        matches!(self, Self::Dirty | Self::Clean | Self::Winner)
    }
}

impl Display for DirectoryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// What a single processor currently holds of a cell.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ProcessorState {
    /// Sole owner, written during the current phase.
    Dirty,
    /// Sole owner, not written during the current phase.
    Clean,
    /// Sole owner whose write survived a race during the current phase.
    Winner,
    /// Read-only copy, valid during the current phase.
    Shared,
    /// Valid as of the previous barrier but not yet revalidated this phase.
    Old,
    /// Not held.
    Invalid,
    /// Lost the write race for the current phase. Further writes are dropped and reads are illegal.
    Loser,
}

impl ProcessorState {
    /// Whether a processor in this state has exclusive rights over the cell.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Dirty | Self::Clean | Self::Winner)
    }
}

impl Display for ProcessorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}
