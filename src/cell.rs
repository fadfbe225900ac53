//! A single coherence-managed storage location.
//!
//! Every cell serializes the requests made on it with its own lock and decides write-write races
//! within a phase deterministically: the processor whose write established ownership first keeps
//! it, any later contender becomes a `Loser` and its write is dropped.

use std::fmt::{Debug, Formatter};

use tracing::{instrument, trace};

use crate::err::{Error, ProtocolViolation, ViolationKind};
use crate::memory::TouchedSets;
use crate::run::RunState;
use crate::state::{DirectoryState, ProcessorState};
use crate::sync::{lock, Arc, Mutex};
use crate::types::{check_processor_id, CellId, ProcessorId};

/// The per-processor barrier hook of a cell, independent of the stored value type.
pub(crate) trait Entry: Send + Sync {
    /// Apply the barrier transition of `processor`. Returns `true` once the processor no longer
    /// holds the cell, meaning it can be dropped from the processor's touched-set.
    fn barrier(&self, processor: ProcessorId) -> bool;
}

/// Everything guarded by a cell's lock.
struct CellState<T> {
    value: T,
    /// Only meaningful while the directory is `Dirty`, `Clean` or `Winner`.
    owner: Option<ProcessorId>,
    directory: DirectoryState,
    processors: Vec<ProcessorState>,
}

impl<T> CellState<T> {
    fn new(value: T, num_processors: usize) -> Self {
        Self {
            value,
            owner: None,
            directory: DirectoryState::Invalid,
            processors: vec![ProcessorState::Invalid; num_processors],
        }
    }

    fn set_owner_state(&mut self, state: ProcessorState) {
        if let Some(owner) = self.owner {
            self.processors[owner] = state;
        }
    }

    fn read(&mut self, processor: ProcessorId) -> Result<(), ViolationKind> {
        match self.processors[processor] {
            ProcessorState::Dirty | ProcessorState::Clean | ProcessorState::Shared => {}
            ProcessorState::Old => self.processors[processor] = ProcessorState::Shared,
            ProcessorState::Winner | ProcessorState::Loser => {
                return Err(ViolationKind::ReadDuringOwnRace)
            }
            ProcessorState::Invalid => match self.directory {
                DirectoryState::Dirty => return Err(ViolationKind::ReadOfDirtyCell),
                DirectoryState::Winner => return Err(ViolationKind::ReadOfRacedCell),
                DirectoryState::Clean => {
                    // a second reader turns single ownership into a shared epoch
                    self.set_owner_state(ProcessorState::Shared);
                    self.owner = None;
                    self.processors[processor] = ProcessorState::Shared;
                    self.directory = DirectoryState::Valid;
                }
                DirectoryState::Valid => self.processors[processor] = ProcessorState::Shared,
                DirectoryState::Invalid => {
                    self.processors[processor] = ProcessorState::Clean;
                    self.directory = DirectoryState::Clean;
                    self.owner = Some(processor);
                }
            },
        }
        Ok(())
    }

    fn write(&mut self, processor: ProcessorId, value: T) -> Result<(), ViolationKind> {
        let processor_state: ProcessorState = self.processors[processor];
        match processor_state {
            ProcessorState::Dirty | ProcessorState::Winner => self.value = value,
            ProcessorState::Clean => {
                self.processors[processor] = ProcessorState::Dirty;
                self.directory = DirectoryState::Dirty;
                self.value = value;
            }
            ProcessorState::Shared => return Err(ViolationKind::WriteWhileShared),
            // already lost this phase, drop the write
            ProcessorState::Loser => {}
            ProcessorState::Old | ProcessorState::Invalid => match self.directory {
                DirectoryState::Dirty => {
                    // the owner already wrote, so it keeps its value and wins
                    self.set_owner_state(ProcessorState::Winner);
                    self.processors[processor] = ProcessorState::Loser;
                    self.directory = DirectoryState::Winner;
                }
                DirectoryState::Clean => {
                    // the owner never wrote, so the contender displaces it
                    self.set_owner_state(ProcessorState::Invalid);
                    self.owner = Some(processor);
                    self.processors[processor] = ProcessorState::Winner;
                    self.directory = DirectoryState::Winner;
                    self.value = value;
                }
                DirectoryState::Winner => self.processors[processor] = ProcessorState::Loser,
                DirectoryState::Invalid if processor_state == ProcessorState::Old => {
                    return Err(ViolationKind::StaleCopyOfUntrackedCell)
                }
                DirectoryState::Valid | DirectoryState::Invalid => {
                    self.owner = Some(processor);
                    self.processors[processor] = ProcessorState::Dirty;
                    self.directory = DirectoryState::Dirty;
                    self.value = value;
                }
            },
        }
        Ok(())
    }

    fn barrier(&mut self, processor: ProcessorId) -> bool {
        match self.processors[processor] {
            ProcessorState::Dirty => {
                self.processors[processor] = ProcessorState::Clean;
                self.directory = DirectoryState::Clean;
                false
            }
            ProcessorState::Clean => false,
            ProcessorState::Winner => {
                self.processors[processor] = ProcessorState::Old;
                self.directory = DirectoryState::Valid;
                self.owner = None;
                false
            }
            ProcessorState::Shared => {
                self.processors[processor] = ProcessorState::Old;
                false
            }
            ProcessorState::Old | ProcessorState::Loser | ProcessorState::Invalid => {
                self.processors[processor] = ProcessorState::Invalid;
                true
            }
        }
    }
}

pub(crate) struct CellCore<T> {
    id: CellId,
    label: String,
    num_processors: usize,
    state: Mutex<CellState<T>>,
}

impl<T> CellCore<T> {
    fn violation(
        &self,
        kind: ViolationKind,
        processor: ProcessorId,
        state: &CellState<T>,
    ) -> ProtocolViolation {
        ProtocolViolation {
            kind,
            processor,
            cell: self.id,
            label: self.label.clone(),
            processor_state: state.processors[processor],
            directory_state: state.directory,
        }
    }
}

impl<T: Send> Entry for CellCore<T> {
    fn barrier(&self, processor: ProcessorId) -> bool {
        let mut state = lock(&self.state);
        let before: ProcessorState = state.processors[processor];
        let now_invalid: bool = state.barrier(processor);
        trace!(
            cell = self.id,
            processor,
            %before,
            after = %state.processors[processor],
            directory = %state.directory,
            "barrier transition"
        );
        now_invalid
    }
}

/// A handle to one coherence-managed location holding a `T`.
///
/// Handles are cheap to clone and all clones refer to the same location. Create cells with
/// [crate::Memory::cell] and friends.
pub struct Cell<T> {
    core: Arc<CellCore<T>>,
    touched: Arc<TouchedSets>,
    run: Arc<RunState>,
}

impl<T: Clone + Send + 'static> Cell<T> {
    pub(crate) fn new(
        id: CellId,
        label: String,
        value: T,
        touched: Arc<TouchedSets>,
        run: Arc<RunState>,
    ) -> Self {
        let num_processors: usize = touched.num_processors();
        Self {
            core: Arc::new(CellCore {
                id,
                label,
                num_processors,
                state: Mutex::new(CellState::new(value, num_processors)),
            }),
            touched,
            run,
        }
    }

    pub(crate) fn entry(&self) -> Arc<dyn Entry> {
        self.core.clone()
    }

    fn touch(&self, processor: ProcessorId) {
        self.touched.touch(processor, self.core.id, || self.entry());
    }

    /// Read the value as `processor`, or report why the protocol forbids it.
    #[instrument(level = "trace", skip(self), fields(cell = self.core.id))]
    pub fn try_read(&self, processor: ProcessorId) -> Result<T, Error> {
        check_processor_id(processor, self.core.num_processors)?;
        self.touch(processor);

        let mut state = lock(&self.core.state);
        let before: ProcessorState = state.processors[processor];
        if let Err(kind) = state.read(processor) {
            return Err(self.core.violation(kind, processor, &state).into());
        }
        trace!(
            %before,
            after = %state.processors[processor],
            directory = %state.directory,
            "read"
        );
        Ok(state.value.clone())
    }

    /// Read the value as `processor`.
    ///
    /// # Panics
    ///
    /// On a protocol violation or an out-of-range processor id. Neither can be recovered from, so
    /// the whole run is aborted.
    #[track_caller]
    pub fn read(&self, processor: ProcessorId) -> T {
        match self.try_read(processor) {
            Ok(value) => value,
            Err(error) => self.run.fail(error),
        }
    }

    /// Write `value` as `processor`, or report why the protocol forbids it.
    ///
    /// A write that loses this phase's race for the cell is silently dropped and still returns
    /// `Ok`.
    #[instrument(level = "trace", skip(self, value), fields(cell = self.core.id))]
    pub fn try_write(&self, processor: ProcessorId, value: T) -> Result<(), Error> {
        check_processor_id(processor, self.core.num_processors)?;
        self.touch(processor);

        let mut state = lock(&self.core.state);
        let before: ProcessorState = state.processors[processor];
        if let Err(kind) = state.write(processor, value) {
            return Err(self.core.violation(kind, processor, &state).into());
        }
        trace!(
            %before,
            after = %state.processors[processor],
            directory = %state.directory,
            "write"
        );
        Ok(())
    }

    /// Write `value` as `processor`.
    ///
    /// # Panics
    ///
    /// On a protocol violation or an out-of-range processor id. Neither can be recovered from, so
    /// the whole run is aborted.
    #[track_caller]
    pub fn write(&self, processor: ProcessorId, value: T) {
        if let Err(error) = self.try_write(processor, value) {
            self.run.fail(error)
        }
    }

    /// The current value, bypassing the protocol. Neither states nor touched-sets change.
    pub fn peek(&self) -> T {
        lock(&self.core.state).value.clone()
    }
}

impl<T> Cell<T> {
    pub fn id(&self) -> CellId {
        self.core.id
    }

    pub fn label(&self) -> &str {
        &self.core.label
    }

    /// What `processor` currently holds of this cell, or `None` if the id is out of range.
    pub fn processor_state(&self, processor: ProcessorId) -> Option<ProcessorState> {
        lock(&self.core.state).processors.get(processor).copied()
    }

    pub fn directory_state(&self) -> DirectoryState {
        lock(&self.core.state).directory
    }

    /// The processor the directory currently tracks as owner, if any.
    pub fn owner(&self) -> Option<ProcessorId> {
        let state = lock(&self.core.state);
        if state.directory.has_owner() {
            state.owner
        } else {
            None
        }
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            touched: self.touched.clone(),
            run: self.run.clone(),
        }
    }
}

impl<T> Debug for Cell<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.core.id)
            .field("label", &self.core.label)
            .finish()
    }
}
