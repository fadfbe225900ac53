//! A software-simulated shared memory for bulk-synchronous ("PRAM-style") parallel algorithms.
//!
//! A fixed set of processors, one per worker thread, alternate between phases of unsynchronized
//! reads and writes to shared [Cell]s and global rendezvous points at a [PhaseBarrier]. Each cell
//! runs a small coherence protocol which lets several processors write it during the same phase
//! without blocking one another: exactly one writer is deterministically declared the winner of
//! the phase and every conflicting write is dropped. Algorithms use this race as arbitration, for
//! example to claim slots of a hash table without locks.
//!
//! A round looks like this for every processor:
//!
//! 1. read and write cells with [Cell::read] and [Cell::write],
//! 2. run [Memory::barrier_pass], which only visits the cells the processor touched,
//! 3. rendezvous with [PhaseBarrier::synchronize].
//!
//! [Processor] wraps the three steps for a single reserved processor id.
//!
//! ```
//! use pccc::{Cell, Memory, PhaseBarrier};
//! use std::thread;
//!
//! let memory = Memory::new(4);
//! let barrier: PhaseBarrier = memory.phase_barrier();
//! let slot: Cell<usize> = memory.named_cell("slot");
//!
//! thread::scope(|scope| {
//!     for id in 0..4 {
//!         let (memory, barrier, slot) = (&memory, &barrier, &slot);
//!         scope.spawn(move || {
//!             slot.write(id, id);
//!             memory.barrier_pass(id);
//!             barrier.synchronize(id);
//!
//!             // all processors agree on the single winner
//!             let winner: usize = slot.read(id);
//!             assert!(winner < 4);
//!         });
//!     }
//! });
//! ```
//!
//! Protocol violations, such as reading a cell a processor raced on before the barrier resolved
//! the race, are bugs in the calling algorithm. [Cell::try_read] and [Cell::try_write] report them
//! as an [Error]; [Cell::read] and [Cell::write] abort the run. The offending processor panics, and
//! so does every processor waiting at a barrier created with [Memory::phase_barrier], so a run
//! never stalls on a processor that will not arrive.

mod backoff;
mod cell;
pub mod err;
mod memory;
mod phase_barrier;
mod processor;
mod run;
mod state;
mod sync;
mod types;

pub use crate::backoff::BackoffConfig;
pub use crate::cell::Cell;
pub use crate::err::{Error, NoProcessorAvailableError, ProtocolViolation, ViolationKind};
pub use crate::memory::Memory;
pub use crate::phase_barrier::{BarrierWaitResult, PhaseBarrier};
pub use crate::processor::{Processor, ProcessorError};
pub use crate::state::{DirectoryState, ProcessorState};
pub use crate::types::{CellId, ProcessorId, Seed};
