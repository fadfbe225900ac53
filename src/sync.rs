//! A module which decides which synchronization primitives to use throughout the rest of the crate
//! depending on features and configuration options

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
        pub(crate) use loom::sync::{Mutex, MutexGuard};
        pub(crate) use loom::thread::yield_now;
    } else if #[cfg(feature = "shuttle")] {
        pub(crate) use shuttle::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
        pub(crate) use shuttle::sync::{Mutex, MutexGuard};
        pub(crate) use shuttle::thread::yield_now;
    } else {
        pub(crate) use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
        pub(crate) use std::sync::{Mutex, MutexGuard};
    }
}

// loom's Arc cannot hold unsized values such as `Arc<dyn Entry>`, so every build uses std's.
pub(crate) use std::sync::Arc;

/// Lock `mutex`, ignoring poisoning.
///
/// A poisoned lock only means some other processor panicked on a protocol violation while holding
/// it. All state is mutated after the violation checks, so the data behind the lock is still
/// consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Give up the processor for roughly `delay_ns` nanoseconds.
///
/// Under a model checker, time is meaningless and the scheduler only needs to know we are spinning.
#[cfg(any(loom, feature = "shuttle"))]
pub(crate) fn pause(_delay_ns: u64) {
    yield_now();
}

/// Give up the processor for roughly `delay_ns` nanoseconds.
#[cfg(not(any(loom, feature = "shuttle")))]
pub(crate) fn pause(delay_ns: u64) {
    if delay_ns == 0 {
        std::hint::spin_loop();
    } else {
        std::thread::sleep(std::time::Duration::from_nanos(delay_ns));
    }
}
