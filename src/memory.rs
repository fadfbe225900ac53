//! The registry owning every cell of a simulation.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use tracing::{debug, instrument, trace};

use crate::backoff::BackoffConfig;
use crate::cell::{Cell, Entry};
use crate::err::Error;
use crate::phase_barrier::PhaseBarrier;
use crate::run::RunState;
use crate::sync::{lock, Arc, AtomicBool, Mutex, Ordering};
use crate::types::{check_processor_id, CellId, ProcessorId};

/// For each processor, the cells it has read or written since it last stopped holding them.
///
/// A processor's set is only ever locked by that processor, so its lock is never contended.
pub(crate) struct TouchedSets {
    sets: Vec<Mutex<HashMap<CellId, Arc<dyn Entry>>>>,
}

impl TouchedSets {
    fn new(num_processors: usize) -> Self {
        Self {
            sets: (0..num_processors)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    pub(crate) fn num_processors(&self) -> usize {
        self.sets.len()
    }

    /// Make sure the cell `cell` is in `processor`'s touched-set. `entry` is only called if the
    /// cell was not there yet.
    pub(crate) fn touch<F>(&self, processor: ProcessorId, cell: CellId, entry: F)
    where
        F: FnOnce() -> Arc<dyn Entry>,
    {
        lock(&self.sets[processor]).entry(cell).or_insert_with(entry);
    }
}

/// The simulated shared memory: creates cells and runs each processor's barrier pass.
///
/// The number of processors is fixed at construction. Share a `Memory` between worker threads by
/// reference (for example with [std::thread::scope]) or behind an [Arc].
///
/// Processor 0 may populate cells before the workers start, as long as it calls
/// [Memory::barrier_pass] afterwards like at the end of any other phase.
///
/// A protocol violation on any cell aborts the run. Processors waiting at a barrier created with
/// [Memory::phase_barrier] then fail as well instead of waiting forever.
pub struct Memory {
    touched: Arc<TouchedSets>,
    run: Arc<RunState>,
    /// Every cell ever created, indexed by [CellId].
    cells: Mutex<Vec<Arc<dyn Entry>>>,
    /// Whether a processor id is currently held by a [crate::Processor].
    processor_slots: Vec<AtomicBool>,
}

impl Memory {
    /// # Panics
    ///
    /// If `num_processors` is 0.
    pub fn new(num_processors: usize) -> Self {
        assert!(num_processors > 0, "a simulation needs at least one processor");
        Self {
            touched: Arc::new(TouchedSets::new(num_processors)),
            run: Arc::new(RunState::new()),
            cells: Mutex::new(Vec::new()),
            processor_slots: (0..num_processors).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn num_processors(&self) -> usize {
        self.touched.num_processors()
    }

    /// The number of cells created so far.
    pub fn num_cells(&self) -> usize {
        lock(&self.cells).len()
    }

    /// Create a cell holding `T::default()`, labelled after its id.
    pub fn cell<T: Default + Clone + Send + 'static>(&self) -> Cell<T> {
        self.create(None, T::default())
    }

    /// Create a cell holding `T::default()` with a label used in diagnostics.
    pub fn named_cell<T>(&self, label: impl Into<String>) -> Cell<T>
    where
        T: Default + Clone + Send + 'static,
    {
        self.create(Some(label.into()), T::default())
    }

    /// Create a cell holding `value` with a label used in diagnostics.
    ///
    /// No processor holds the cell yet, so the first processor to touch it sees `value`.
    pub fn cell_with_value<T>(&self, label: impl Into<String>, value: T) -> Cell<T>
    where
        T: Clone + Send + 'static,
    {
        self.create(Some(label.into()), value)
    }

    fn create<T: Clone + Send + 'static>(&self, label: Option<String>, value: T) -> Cell<T> {
        let mut cells = lock(&self.cells);
        let id: CellId = cells.len();
        let label: String = label.unwrap_or_else(|| format!("cell#{id}"));
        trace!(cell = id, %label, "creating cell");

        let cell: Cell<T> = Cell::new(id, label, value, self.touched.clone(), self.run.clone());
        cells.push(cell.entry());
        cell
    }

    /// Run the barrier transition of `processor` on every cell in its touched-set, dropping the
    /// cells it no longer holds. Returns the number of cells visited.
    #[instrument(level = "debug", skip(self))]
    pub fn try_barrier_pass(&self, processor: ProcessorId) -> Result<usize, Error> {
        check_processor_id(processor, self.num_processors())?;

        let mut touched = lock(&self.touched.sets[processor]);
        let visited: usize = touched.len();
        touched.retain(|_, entry| !entry.barrier(processor));
        debug!(visited, still_held = touched.len(), "barrier pass finished");
        Ok(visited)
    }

    /// Run the barrier transition of `processor` on every cell it touched. Must be called by every
    /// processor after finishing a phase's reads and writes and before rendezvousing.
    ///
    /// # Panics
    ///
    /// If `processor` is out of range.
    #[track_caller]
    pub fn barrier_pass(&self, processor: ProcessorId) -> usize {
        match self.try_barrier_pass(processor) {
            Ok(visited) => visited,
            Err(error) => self.run.fail(error),
        }
    }

    /// A [PhaseBarrier] for this memory's processors which shares its run, so that waiters stop
    /// waiting once any processor aborts the run.
    pub fn phase_barrier(&self) -> PhaseBarrier {
        self.phase_barrier_with_config(BackoffConfig::default())
    }

    pub fn phase_barrier_with_config(&self, config: BackoffConfig) -> PhaseBarrier {
        PhaseBarrier::for_run(self.num_processors(), config, self.run.clone())
    }

    /// Abort the run, for example because a processor is unwinding.
    pub(crate) fn abort_run(&self) {
        self.run.abort();
    }

    /// Drop `cell` from `processor`'s touched-set without running its barrier transition. Returns
    /// whether the cell was there.
    pub fn invalidate(&self, processor: ProcessorId, cell: CellId) -> Result<bool, Error> {
        check_processor_id(processor, self.num_processors())?;
        Ok(lock(&self.touched.sets[processor]).remove(&cell).is_some())
    }

    /// Reserve the lowest processor id not currently held by a [crate::Processor].
    pub(crate) fn claim_processor_id(&self) -> Option<ProcessorId> {
        self.processor_slots.iter().position(|slot| {
            slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    pub(crate) fn release_processor_id(&self, processor: ProcessorId) {
        self.processor_slots[processor].store(false, Ordering::Release);
    }

    /// The number of cells `processor`'s next barrier pass will visit.
    ///
    /// # Panics
    ///
    /// If `processor` is out of range.
    pub fn touched_count(&self, processor: ProcessorId) -> usize {
        lock(&self.touched.sets[processor]).len()
    }
}

impl Debug for Memory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("num_processors", &self.num_processors())
            .field("num_cells", &self.num_cells())
            .finish()
    }
}
