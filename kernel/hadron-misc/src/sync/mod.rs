//! Synchronization primitives used by the registry.
//!
//! The registry needs exactly one lock. [`SpinLock`] is usable in `no_std`
//! before any scheduler exists and is short-held by construction: no driver
//! callback or loader request ever runs under it.

pub(crate) mod loom_compat;
mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard};
