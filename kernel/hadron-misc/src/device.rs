//! Misc device descriptors.
//!
//! A driver builds one [`MiscDevice`] per node it wants, keeps it in an
//! `Arc`, and passes it to [`MiscRegistry::register`]. The registry links a
//! clone while the device is registered but never owns it: the driver must
//! deregister before dropping its own reference to the operations.
//!
//! [`MiscRegistry::register`]: crate::MiscRegistry::register

use alloc::string::String;
use core::fmt;

use crate::devnum::MinorRequest;
use crate::ops::OpsTable;
use crate::sync::loom_compat::{AtomicBool, AtomicU32, Ordering};

/// Stored in `minor` while no minor is assigned.
const NO_MINOR: u32 = u32::MAX;

/// A misc device as declared by its driver.
pub struct MiscDevice {
    request: MinorRequest,
    minor: AtomicU32,
    name: Option<String>,
    node_name: Option<String>,
    ops: OpsTable,
    linked: AtomicBool,
}

impl MiscDevice {
    /// Creates an unregistered device.
    pub fn new(request: MinorRequest, ops: OpsTable) -> Self {
        Self {
            request,
            minor: AtomicU32::new(NO_MINOR),
            name: None,
            node_name: None,
            ops,
            linked: AtomicBool::new(false),
        }
    }

    /// Sets the display name (shown in the registry listing).
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the node name the namespace should use, e.g. `"net/tun"`.
    #[must_use]
    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    /// Returns the minor the driver asked for.
    pub fn request(&self) -> MinorRequest {
        self.request
    }

    /// Returns the assigned minor while the device is registered.
    pub fn minor(&self) -> Option<u32> {
        match self.minor.load(Ordering::Acquire) {
            NO_MINOR => None,
            minor => Some(minor),
        }
    }

    /// Returns the display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the node name override.
    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    /// Returns the name the namespace should give the node: the override if
    /// set, otherwise the display name.
    pub fn preferred_name(&self) -> Option<&str> {
        self.node_name().or(self.name())
    }

    /// Returns the operation table.
    pub fn ops(&self) -> &OpsTable {
        &self.ops
    }

    /// Returns `true` while the device is linked into a registry.
    pub fn is_registered(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    // Mutated only with the registry lock held.

    pub(crate) fn link(&self, minor: u32) {
        self.minor.store(minor, Ordering::Release);
        self.linked.store(true, Ordering::Release);
    }

    pub(crate) fn unlink(&self) {
        self.linked.store(false, Ordering::Release);
        self.minor.store(NO_MINOR, Ordering::Release);
    }
}

impl fmt::Debug for MiscDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiscDevice")
            .field("request", &self.request)
            .field("minor", &self.minor())
            .field("name", &self.name)
            .field("node_name", &self.node_name)
            .field("linked", &self.is_registered())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom), not(shuttle)))]
mod tests {
    use super::*;
    use crate::ops::FileOperations;

    struct Nop;
    impl FileOperations for Nop {}

    #[test]
    fn fresh_device_is_unlinked() {
        let dev = MiscDevice::new(MinorRequest::Dynamic, OpsTable::new("nop", Nop));
        assert!(!dev.is_registered());
        assert_eq!(dev.minor(), None);
        assert_eq!(dev.request(), MinorRequest::Dynamic);
        assert_eq!(dev.preferred_name(), None);
    }

    #[test]
    fn node_name_wins_over_display_name() {
        let dev = MiscDevice::new(MinorRequest::Fixed(200), OpsTable::new("tun", Nop))
            .with_name("tun")
            .with_node_name("net/tun");
        assert_eq!(dev.name(), Some("tun"));
        assert_eq!(dev.preferred_name(), Some("net/tun"));

        let plain = MiscDevice::new(MinorRequest::Fixed(1), OpsTable::new("psaux", Nop))
            .with_name("psaux");
        assert_eq!(plain.preferred_name(), Some("psaux"));
    }

    #[test]
    fn link_and_unlink() {
        let dev = MiscDevice::new(MinorRequest::Dynamic, OpsTable::new("nop", Nop));
        dev.link(7);
        assert!(dev.is_registered());
        assert_eq!(dev.minor(), Some(7));
        dev.unlink();
        assert!(!dev.is_registered());
        assert_eq!(dev.minor(), None);
    }
}
