//! Misc subsystem error types.
//!
//! Every error maps to a negative Linux errno through `errno()` so the
//! syscall layer can hand it straight back to userspace.

use core::fmt;

/// Raw errno values used by this crate.
pub mod errno {
    /// Operation not permitted.
    pub const EPERM: i32 = 1;
    /// I/O error.
    pub const EIO: i32 = 5;
    /// Try again.
    pub const EAGAIN: i32 = 11;
    /// Out of memory.
    pub const ENOMEM: i32 = 12;
    /// Device or resource busy.
    pub const EBUSY: i32 = 16;
    /// File exists.
    pub const EEXIST: i32 = 17;
    /// No such device.
    pub const ENODEV: i32 = 19;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// Inappropriate ioctl for device.
    pub const ENOTTY: i32 = 25;
}

/// Errors from [`register`](crate::MiscRegistry::register),
/// [`deregister`](crate::MiscRegistry::deregister) and
/// [`shutdown`](crate::MiscRegistry::shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiscError {
    /// The device is already linked, or its fixed minor is taken.
    AlreadyRegistered(u32),
    /// Every dynamic minor is in use.
    AllocationExhausted,
    /// The namespace refused to create the device node.
    DeviceCreateFailed {
        /// Minor the node was requested for (stays marked in the pool).
        minor: u32,
        /// Error reported by the namespace.
        error: NodeError,
    },
    /// The device is not currently registered.
    NotRegistered,
    /// Teardown was requested while drivers were still registered.
    Busy {
        /// Number of devices still linked.
        remaining: usize,
    },
}

impl MiscError {
    /// Returns the negative errno for this error.
    pub const fn errno(self) -> i32 {
        match self {
            Self::AlreadyRegistered(_) | Self::AllocationExhausted | Self::Busy { .. } => {
                -errno::EBUSY
            }
            Self::DeviceCreateFailed { error, .. } => error.errno(),
            Self::NotRegistered => -errno::EINVAL,
        }
    }
}

impl fmt::Display for MiscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(minor) => write!(f, "misc minor {minor} already registered"),
            Self::AllocationExhausted => f.write_str("no free dynamic misc minors"),
            Self::DeviceCreateFailed { minor, error } => {
                write!(f, "failed to create node for misc minor {minor}: {error}")
            }
            Self::NotRegistered => f.write_str("misc device not registered"),
            Self::Busy { remaining } => {
                write!(f, "{remaining} misc device(s) still registered")
            }
        }
    }
}

/// Errors from [`MiscRegistry::open`](crate::MiscRegistry::open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenError {
    /// No driver claimed the minor, even after the load request.
    NoSuchDevice(u32),
    /// The driver's open hook refused the open.
    Driver(DriverError),
}

impl OpenError {
    /// Returns the negative errno for this error.
    pub const fn errno(self) -> i32 {
        match self {
            Self::NoSuchDevice(_) => -errno::ENODEV,
            Self::Driver(err) => err.errno(),
        }
    }
}

impl From<DriverError> for OpenError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchDevice(minor) => write!(f, "no misc device for minor {minor}"),
            Self::Driver(err) => write!(f, "driver open failed: {err}"),
        }
    }
}

/// Errors returned by driver file operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The device is already in exclusive use.
    Busy,
    /// The caller lacks permission for this operation.
    PermissionDenied,
    /// The hardware behind the device is gone.
    NoDevice,
    /// An argument was rejected by the driver.
    InvalidArgument,
    /// The driver does not implement this operation.
    NotSupported,
    /// The operation would block.
    WouldBlock,
    /// A hardware I/O error occurred.
    Io,
    /// Any other errno. Either sign is accepted; [`errno`](Self::errno)
    /// always reports it negated.
    Errno(i32),
}

impl DriverError {
    /// Returns the negative errno for this error.
    pub const fn errno(self) -> i32 {
        match self {
            Self::Busy => -errno::EBUSY,
            Self::PermissionDenied => -errno::EPERM,
            Self::NoDevice => -errno::ENODEV,
            Self::InvalidArgument => -errno::EINVAL,
            Self::NotSupported => -errno::ENOTTY,
            Self::WouldBlock => -errno::EAGAIN,
            Self::Io => -errno::EIO,
            Self::Errno(code) => code.wrapping_abs().wrapping_neg(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("device busy"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::NoDevice => f.write_str("no such device"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::NotSupported => f.write_str("operation not supported"),
            Self::WouldBlock => f.write_str("operation would block"),
            Self::Io => f.write_str("I/O error"),
            Self::Errno(code) => write!(f, "errno {code}"),
        }
    }
}

/// Errors reported by a [`DeviceNamespace`](crate::DeviceNamespace).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeError {
    /// A node with the same name already exists.
    AlreadyExists,
    /// The namespace ran out of memory.
    NoMemory,
    /// The node name is not acceptable.
    InvalidName,
    /// Backing store failure.
    Io,
}

impl NodeError {
    /// Returns the negative errno for this error.
    pub const fn errno(self) -> i32 {
        match self {
            Self::AlreadyExists => -errno::EEXIST,
            Self::NoMemory => -errno::ENOMEM,
            Self::InvalidName => -errno::EINVAL,
            Self::Io => -errno::EIO,
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("node already exists"),
            Self::NoMemory => f.write_str("out of memory"),
            Self::InvalidName => f.write_str("invalid node name"),
            Self::Io => f.write_str("I/O error"),
        }
    }
}
