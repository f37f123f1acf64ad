//! Model-checker compatibility shim.
//!
//! With `cfg(loom)` the atomics come from loom, with `cfg(shuttle)` from
//! shuttle, otherwise from `core`. Everything in this crate that is shared
//! between threads (the registry lock, ops-table reference counts, the
//! device `linked` flag) imports its atomics from here so the same code runs
//! under either scheduler.
//!
//! Atomics from loom/shuttle must be created inside the model closure, so
//! ordinary unit tests are compiled out under those cfgs.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

#[cfg(not(any(loom, shuttle)))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Hint issued while spinning on a held lock.
///
/// Under a model checker the spinning thread must yield, otherwise the
/// scheduler never runs the lock holder.
#[inline]
pub(crate) fn spin_hint() {
    #[cfg(loom)]
    loom::thread::yield_now();

    #[cfg(all(shuttle, not(loom)))]
    shuttle::thread::yield_now();

    #[cfg(not(any(loom, shuttle)))]
    core::hint::spin_loop();
}
