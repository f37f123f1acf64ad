//! Open-file sessions.
//!
//! An [`OpenFile`] is what the VFS hands to the misc dispatcher: open
//! flags, possibly an operation table bound by an earlier layer, and a slot
//! for driver private data. After a successful
//! [`MiscRegistry::open`](crate::MiscRegistry::open) the file holds a
//! counted handle to the driver's [`OpsTable`](crate::OpsTable) and every
//! further operation goes straight to the driver. Dropping the session runs
//! the driver's release hook exactly once.

use alloc::boxed::Box;
use core::any::Any;
use core::fmt;

use bitflags::bitflags;

use crate::devnum::DevNum;
use crate::error::DriverError;
use crate::ops::OpsHandle;

bitflags! {
    /// Flags the file was opened with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open for reading.
        const READ     = 0b0001;
        /// Open for writing.
        const WRITE    = 0b0010;
        /// Non-blocking I/O.
        const NONBLOCK = 0b0100;
        /// Exclusive open.
        const EXCL     = 0b1000;
    }
}

/// One client session on a misc device.
pub struct OpenFile {
    flags: OpenFlags,
    dev: Option<DevNum>,
    ops: Option<OpsHandle>,
    private: Option<Box<dyn Any + Send>>,
}

impl OpenFile {
    /// Creates an unbound session.
    #[must_use]
    pub fn new(flags: OpenFlags) -> Self {
        Self {
            flags,
            dev: None,
            ops: None,
            private: None,
        }
    }

    /// Creates a session already bound to `ops` by an outer layer.
    #[must_use]
    pub fn with_ops(flags: OpenFlags, ops: OpsHandle) -> Self {
        let mut file = Self::new(flags);
        file.ops = Some(ops);
        file
    }

    /// Returns the open flags.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Returns the device number the session was opened on.
    pub fn dev(&self) -> Option<DevNum> {
        self.dev
    }

    /// Returns the active operation table handle.
    pub fn ops(&self) -> Option<&OpsHandle> {
        self.ops.as_ref()
    }

    /// Returns the driver's private data, if it is a `T`.
    pub fn private_data<T: Any>(&self) -> Option<&T> {
        self.private.as_deref()?.downcast_ref()
    }

    /// Returns the driver's private data mutably, if it is a `T`.
    pub fn private_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.private.as_deref_mut()?.downcast_mut()
    }

    /// Stores driver private data, replacing any previous value.
    pub fn set_private_data<T: Any + Send>(&mut self, data: T) {
        self.private = Some(Box::new(data));
    }

    /// Removes and returns the driver private data.
    pub fn take_private_data(&mut self) -> Option<Box<dyn Any + Send>> {
        self.private.take()
    }

    /// Reads through the active driver.
    ///
    /// # Errors
    ///
    /// [`DriverError::NoDevice`] if no driver is bound, otherwise whatever
    /// the driver returns.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, DriverError> {
        let ops = self.ops.as_ref().ok_or(DriverError::NoDevice)?.ops_ref();
        ops.read(self, buf)
    }

    /// Writes through the active driver.
    ///
    /// # Errors
    ///
    /// [`DriverError::NoDevice`] if no driver is bound, otherwise whatever
    /// the driver returns.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, DriverError> {
        let ops = self.ops.as_ref().ok_or(DriverError::NoDevice)?.ops_ref();
        ops.write(self, buf)
    }

    /// Issues a control request to the active driver.
    ///
    /// # Errors
    ///
    /// [`DriverError::NoDevice`] if no driver is bound, otherwise whatever
    /// the driver returns.
    pub fn ioctl(&mut self, cmd: u32, arg: usize) -> Result<usize, DriverError> {
        let ops = self.ops.as_ref().ok_or(DriverError::NoDevice)?.ops_ref();
        ops.ioctl(self, cmd, arg)
    }

    /// Closes the session. Same as dropping it: the driver's release hook
    /// runs, then the operation table handle is dropped.
    pub fn close(self) {
        drop(self);
    }

    pub(crate) fn replace_dev(&mut self, dev: Option<DevNum>) -> Option<DevNum> {
        core::mem::replace(&mut self.dev, dev)
    }

    /// Installs `ops` as the active table and returns the previous one.
    pub(crate) fn replace_ops(&mut self, ops: Option<OpsHandle>) -> Option<OpsHandle> {
        core::mem::replace(&mut self.ops, ops)
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if let Some(ops) = self.ops.as_ref().map(OpsHandle::ops_ref) {
            ops.release(self);
        }
    }
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile")
            .field("flags", &self.flags)
            .field("dev", &self.dev)
            .field("ops", &self.ops)
            .field("has_private", &self.private.is_some())
            .finish()
    }
}
