use pccc::{Cell, Memory, PhaseBarrier};
use tracing::debug;

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::Arc;
        pub(crate) use loom::thread;
    } else if #[cfg(feature = "shuttle")] {
        pub(crate) use shuttle::sync::Arc;
        pub(crate) use shuttle::thread;
    } else {
        pub(crate) use std::sync::Arc;
        pub(crate) use std::thread;
    }
}

/// Every processor races to write its own id into one cell, then all of them read the committed
/// value after the barrier. They must all agree on a single winner.
pub(crate) fn concurrency_test<const NUM_PROCESSORS: usize>() {
    let memory: Arc<Memory> = Arc::new(Memory::new(NUM_PROCESSORS));
    let barrier: Arc<PhaseBarrier> = Arc::new(memory.phase_barrier());
    let slot: Cell<usize> = memory.named_cell("slot");

    let join_handles: Vec<thread::JoinHandle<usize>> = (0..NUM_PROCESSORS)
        .map(|id| {
            let memory: Arc<Memory> = memory.clone();
            let barrier: Arc<PhaseBarrier> = barrier.clone();
            let slot: Cell<usize> = slot.clone();
            thread::spawn(move || {
                slot.write(id, id);
                memory.barrier_pass(id);
                barrier.synchronize(id);

                let winner: usize = slot.read(id);
                memory.barrier_pass(id);
                barrier.synchronize(id);
                winner
            })
        })
        .collect();

    let winners: Vec<usize> = join_handles
        .into_iter()
        .map(|join_handle| join_handle.join().expect("A processor panicked"))
        .collect();
    debug!("winners seen by each processor: {winners:?}");

    assert!(winners[0] < NUM_PROCESSORS);
    assert!(winners.iter().all(|winner| *winner == winners[0]));
    assert_eq!(slot.peek(), winners[0]);
}
