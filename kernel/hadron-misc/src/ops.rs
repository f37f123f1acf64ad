//! Driver operation tables and counted handles.
//!
//! A driver exposes its entry points through [`FileOperations`] wrapped in
//! an [`OpsTable`]. Every open file that dispatches to the driver pins the
//! table with an [`OpsHandle`]; the handle count tells the owning driver
//! when no session can call into it any more.
//!
//! Counting is separate from memory management: the table's memory lives
//! in an `Arc` and is freed when the last clone goes, but the handle count
//! is what a driver consults before tearing down the state its operations
//! touch. [`OpsTable::retire`] stops new handles from being handed out, so
//! a driver that is going away can wait for the count to drain.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::ops::Deref;

use crate::error::DriverError;
use crate::file::OpenFile;
use crate::sync::loom_compat::{AtomicUsize, Ordering};

/// Entry points a misc driver exposes to open files.
///
/// Only [`open`](FileOperations::open) is interpreted by the registry; the
/// rest are forwarded unchanged from [`OpenFile`].
pub trait FileOperations: Send + Sync {
    /// Called once when a file is opened on the driver's minor.
    ///
    /// The default is "no open hook": the open always succeeds.
    fn open(&self, file: &mut OpenFile) -> Result<(), DriverError> {
        let _ = file;
        Ok(())
    }

    /// Called once when the session is closed or dropped.
    fn release(&self, file: &mut OpenFile) {
        let _ = file;
    }

    /// Reads from the device.
    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, DriverError> {
        let _ = (file, buf);
        Err(DriverError::NotSupported)
    }

    /// Writes to the device.
    fn write(&self, file: &mut OpenFile, buf: &[u8]) -> Result<usize, DriverError> {
        let _ = (file, buf);
        Err(DriverError::NotSupported)
    }

    /// Device-specific control request.
    fn ioctl(&self, file: &mut OpenFile, cmd: u32, arg: usize) -> Result<usize, DriverError> {
        let _ = (file, cmd, arg);
        Err(DriverError::NotSupported)
    }
}

/// Set in `OpsInner::state` once the owner has retired the table.
const RETIRED: usize = 1 << (usize::BITS - 1);

struct OpsInner {
    owner: &'static str,
    ops: Box<dyn FileOperations>,
    /// Handle count in the low bits, [`RETIRED`] in the top bit. One word,
    /// so `acquire` and `retire` are ordered by the same atomic.
    state: AtomicUsize,
}

/// A driver's operation table, shared between the driver and the registry.
#[derive(Clone)]
pub struct OpsTable {
    inner: Arc<OpsInner>,
}

impl OpsTable {
    /// Wraps `ops` in a table owned by the driver called `owner`.
    pub fn new<O: FileOperations + 'static>(owner: &'static str, ops: O) -> Self {
        Self {
            inner: Arc::new(OpsInner {
                owner,
                ops: Box::new(ops),
                state: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns the owning driver's name.
    pub fn owner(&self) -> &'static str {
        self.inner.owner
    }

    /// Pins the table for one more holder.
    ///
    /// Returns `None` once the owner has called [`retire`](Self::retire).
    pub fn acquire(&self) -> Option<OpsHandle> {
        let mut state = self.inner.state.load(Ordering::Acquire);
        loop {
            if state & RETIRED != 0 {
                return None;
            }
            match self.inner.state.compare_exchange(
                state,
                state + 1,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => state = current,
            }
        }
        Some(OpsHandle {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Refuses all future [`acquire`](Self::acquire) calls.
    ///
    /// Existing handles stay valid; the owner waits for
    /// [`is_idle`](Self::is_idle) before tearing down driver state.
    pub fn retire(&self) {
        self.inner.state.fetch_or(RETIRED, Ordering::AcqRel);
    }

    /// Returns `true` once [`retire`](Self::retire) has been called.
    pub fn is_retired(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) & RETIRED != 0
    }

    /// Returns the number of live handles.
    pub fn ref_count(&self) -> usize {
        self.inner.state.load(Ordering::Acquire) & !RETIRED
    }

    /// Returns `true` if no handle is outstanding.
    pub fn is_idle(&self) -> bool {
        self.ref_count() == 0
    }

    /// Returns `true` if both values refer to the same table.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for OpsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpsTable")
            .field("owner", &self.inner.owner)
            .field("refs", &self.ref_count())
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// One counted reference to an [`OpsTable`].
///
/// Dropping the handle (or calling [`release`](Self::release)) gives the
/// reference back. Cloning always succeeds, even on a retired table: the
/// holder already pins it.
pub struct OpsHandle {
    inner: Arc<OpsInner>,
}

impl OpsHandle {
    /// Gives the reference back to the table.
    pub fn release(self) {
        drop(self);
    }

    /// Returns the table this handle pins.
    pub fn table(&self) -> OpsTable {
        OpsTable {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns `true` if the handle pins `table`.
    pub fn is_for(&self, table: &OpsTable) -> bool {
        Arc::ptr_eq(&self.inner, &table.inner)
    }

    /// Borrows the operations without holding `self` borrowed.
    ///
    /// Lets a caller pass `&mut OpenFile` to an operation while the handle
    /// itself sits inside that file. Does not touch the handle count.
    pub(crate) fn ops_ref(&self) -> OpsRef {
        OpsRef(Arc::clone(&self.inner))
    }
}

impl Clone for OpsHandle {
    fn clone(&self) -> Self {
        self.inner.state.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for OpsHandle {
    fn drop(&mut self) {
        self.inner.state.fetch_sub(1, Ordering::Release);
    }
}

impl Deref for OpsHandle {
    type Target = dyn FileOperations;

    fn deref(&self) -> &Self::Target {
        &*self.inner.ops
    }
}

impl fmt::Debug for OpsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpsHandle").field(&self.inner.owner).finish()
    }
}

/// Uncounted borrow of a table's operations. See [`OpsHandle::ops_ref`].
pub(crate) struct OpsRef(Arc<OpsInner>);

impl Deref for OpsRef {
    type Target = dyn FileOperations;

    fn deref(&self) -> &Self::Target {
        &*self.0.ops
    }
}

#[cfg(all(test, not(loom), not(shuttle)))]
mod tests {
    use super::*;
    use crate::file::OpenFlags;

    struct Echo;

    impl FileOperations for Echo {
        fn read(&self, _file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, DriverError> {
            buf.fill(b'e');
            Ok(buf.len())
        }
    }

    struct Bare;
    impl FileOperations for Bare {}

    #[test]
    fn acquire_and_release_track_count() {
        let table = OpsTable::new("echo", Echo);
        assert!(table.is_idle());

        let a = table.acquire().unwrap();
        let b = table.acquire().unwrap();
        assert_eq!(table.ref_count(), 2);

        a.release();
        assert_eq!(table.ref_count(), 1);
        drop(b);
        assert!(table.is_idle());
    }

    #[test]
    fn clone_counts_as_acquire() {
        let table = OpsTable::new("echo", Echo);
        let a = table.acquire().unwrap();
        let b = a.clone();
        assert_eq!(table.ref_count(), 2);
        assert!(b.is_for(&table));
        drop((a, b));
        assert_eq!(table.ref_count(), 0);
    }

    #[test]
    fn retired_table_refuses_new_handles() {
        let table = OpsTable::new("echo", Echo);
        let held = table.acquire().unwrap();
        table.retire();

        assert!(table.is_retired());
        assert!(table.acquire().is_none());
        assert_eq!(table.ref_count(), 1);

        // Retiring twice keeps the flag and the count.
        table.retire();
        assert!(table.is_retired());
        assert_eq!(table.ref_count(), 1);

        // Existing holders keep working and can still be cloned.
        let again = held.clone();
        assert_eq!(table.ref_count(), 2);
        drop((held, again));
        assert!(table.is_idle());
    }

    #[test]
    fn default_operations() {
        let table = OpsTable::new("bare", Bare);
        let handle = table.acquire().unwrap();
        let mut file = OpenFile::new(OpenFlags::READ);
        assert_eq!(handle.open(&mut file), Ok(()));
        assert_eq!(
            handle.read(&mut file, &mut [0; 4]),
            Err(DriverError::NotSupported)
        );
        assert_eq!(handle.write(&mut file, b"x"), Err(DriverError::NotSupported));
        assert_eq!(handle.ioctl(&mut file, 1, 0), Err(DriverError::NotSupported));
    }

    #[test]
    fn table_identity() {
        let a = OpsTable::new("echo", Echo);
        let b = OpsTable::new("echo", Echo);
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.owner(), "echo");
        let handle = a.acquire().unwrap();
        assert!(handle.table().ptr_eq(&a));
        assert!(!handle.is_for(&b));
    }
}
