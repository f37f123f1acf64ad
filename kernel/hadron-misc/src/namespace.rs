//! Collaborators the registry calls out to.
//!
//! [`DeviceNamespace`] makes device nodes visible (devfs, sysfs, or
//! nothing at all) and [`ModuleLoader`] gets a chance to load a driver for a
//! minor nobody has claimed yet. Both are supplied by the embedder; the
//! [`NullNamespace`] and [`NullLoader`] stand-ins do nothing.

use core::fmt;

use crate::device::MiscDevice;
use crate::devnum::DevNum;
use crate::error::NodeError;

/// Opaque token for a created node, chosen by the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u64);

/// Creates and destroys device nodes for registered devices.
///
/// Both calls run with the registry lock held and must not call back into
/// the registry.
pub trait DeviceNamespace: Send + Sync {
    /// Creates the node for `device` under `class` at `dev`.
    ///
    /// `preferred_name` is the device's node-name override or display name.
    ///
    /// # Errors
    ///
    /// Any [`NodeError`] aborts the registration.
    fn create(
        &self,
        class: &str,
        dev: DevNum,
        device: &MiscDevice,
        preferred_name: Option<&str>,
    ) -> Result<NodeHandle, NodeError>;

    /// Removes the node previously created at `dev`.
    fn destroy(&self, class: &str, dev: DevNum);
}

/// A request to load the driver for one misc minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    /// Misc major number.
    pub major: u32,
    /// Minor nobody has claimed.
    pub minor: u32,
}

impl LoadRequest {
    /// Returns the device number being requested.
    pub const fn dev(self) -> DevNum {
        DevNum::new(self.major, self.minor)
    }
}

/// Formats as the module alias `char-major-<major>-<minor>`.
impl fmt::Display for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "char-major-{}-{}", self.major, self.minor)
    }
}

/// Tries to make a driver for a minor appear.
///
/// Called without the registry lock; the loaded driver is expected to call
/// [`MiscRegistry::register`](crate::MiscRegistry::register) before
/// returning. Best effort: the outcome is judged only by the second lookup.
pub trait ModuleLoader: Send + Sync {
    /// Requests the module matching `request`.
    fn request_module(&self, request: &LoadRequest);
}

/// Namespace that creates nothing and always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNamespace;

impl DeviceNamespace for NullNamespace {
    fn create(
        &self,
        _class: &str,
        dev: DevNum,
        _device: &MiscDevice,
        _preferred_name: Option<&str>,
    ) -> Result<NodeHandle, NodeError> {
        Ok(NodeHandle(u64::from(dev.minor())))
    }

    fn destroy(&self, _class: &str, _dev: DevNum) {}
}

/// Loader that never loads anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLoader;

impl ModuleLoader for NullLoader {
    fn request_module(&self, _request: &LoadRequest) {}
}
