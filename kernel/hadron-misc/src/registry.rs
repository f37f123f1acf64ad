//! The misc device registry.
//!
//! One [`SpinLock`] guards both the ordered device list and the dynamic
//! minor bitmap; it is the only source of truth for "which driver owns
//! minor N". New devices go to the front of the list and lookups scan front
//! to back, so a later registration shadows an earlier one if a caller ever
//! bypasses the collision check.
//!
//! Lock discipline: the namespace's `create`/`destroy` run under the lock
//! (they are part of linking a device); the module loader, driver open
//! hooks, and log sinks never do.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::fmt;

use crate::config::MiscConfig;
use crate::device::MiscDevice;
use crate::devnum::{DevNum, MinorRequest};
use crate::error::MiscError;
use crate::minors::MinorAllocator;
use crate::namespace::{DeviceNamespace, ModuleLoader, NodeHandle};
use crate::ops::OpsHandle;
use crate::sync::SpinLock;
use crate::{kerr, kinfo, kwarn};

/// A device while it is linked into the registry.
pub(crate) struct Linked {
    pub(crate) device: Arc<MiscDevice>,
    pub(crate) minor: u32,
    pub(crate) node: NodeHandle,
}

/// Registered devices, most recent first.
#[derive(Default)]
pub(crate) struct DeviceList {
    entries: VecDeque<Linked>,
}

impl DeviceList {
    pub(crate) fn insert_front(&mut self, linked: Linked) {
        self.entries.push_front(linked);
    }

    /// First entry for `minor`, scanning front to back.
    pub(crate) fn find(&self, minor: u32) -> Option<&Linked> {
        self.entries.iter().find(|l| l.minor == minor)
    }

    pub(crate) fn remove(&mut self, device: &Arc<MiscDevice>) -> Option<Linked> {
        let pos = self
            .entries
            .iter()
            .position(|l| Arc::ptr_eq(&l.device, device))?;
        self.entries.remove(pos)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Linked> {
        self.entries.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// State guarded by the registry lock.
pub(crate) struct RegistryInner {
    pub(crate) devices: DeviceList,
    pub(crate) minors: MinorAllocator,
}

/// Registry of misc devices and dispatcher for opens on the misc major.
///
/// Create one at subsystem init and pass it by reference to drivers and to
/// the char-device layer; there is no global instance.
pub struct MiscRegistry {
    config: MiscConfig,
    pub(crate) inner: SpinLock<RegistryInner>,
    namespace: Arc<dyn DeviceNamespace>,
    pub(crate) loader: Arc<dyn ModuleLoader>,
}

impl MiscRegistry {
    /// Creates an empty registry: no devices, every dynamic minor free.
    pub fn new(
        config: MiscConfig,
        namespace: Arc<dyn DeviceNamespace>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        kinfo!(
            "misc: major {}, {} dynamic minors, class '{}'",
            config.major,
            config.dynamic_minors,
            config.class_name
        );
        Self {
            inner: SpinLock::named(
                "MISC",
                RegistryInner {
                    devices: DeviceList::default(),
                    minors: MinorAllocator::new(config.dynamic_minors, config.reserve_minor_zero),
                },
            ),
            config,
            namespace,
            loader,
        }
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &MiscConfig {
        &self.config
    }

    /// Registers `device` and returns its minor.
    ///
    /// A [`MinorRequest::Dynamic`] device gets the highest free minor of the
    /// dynamic pool. A fixed minor inside the pool's range is marked taken so
    /// dynamic allocation skips it. On success the device node exists and
    /// opens on the minor reach the device's operations.
    ///
    /// # Errors
    ///
    /// - [`MiscError::AlreadyRegistered`] if the device is already linked or
    ///   another device holds its fixed minor. Nothing is changed.
    /// - [`MiscError::AllocationExhausted`] if no dynamic minor is free.
    ///   Nothing is changed.
    /// - [`MiscError::DeviceCreateFailed`] if the namespace rejects the
    ///   node. The device is not linked, but the minor stays marked taken.
    pub fn register(&self, device: &Arc<MiscDevice>) -> Result<u32, MiscError> {
        let result = self.link(device);
        match result {
            Ok(minor) => kinfo!(
                "misc: registered '{}' at {}",
                device.name().unwrap_or(""),
                DevNum::new(self.config.major, minor)
            ),
            Err(MiscError::DeviceCreateFailed { minor, error }) => kwarn!(
                "misc: node for '{}' (minor {minor}) failed: {error}; minor stays reserved",
                device.name().unwrap_or("")
            ),
            Err(err) => kwarn!(
                "misc: cannot register '{}' ({}): {err}",
                device.name().unwrap_or(""),
                device.request()
            ),
        }
        result
    }

    fn link(&self, device: &Arc<MiscDevice>) -> Result<u32, MiscError> {
        let mut inner = self.inner.lock();

        if let (true, Some(minor)) = (device.is_registered(), device.minor()) {
            return Err(MiscError::AlreadyRegistered(minor));
        }

        let minor = match device.request() {
            MinorRequest::Fixed(minor) => {
                if inner.devices.find(minor).is_some() {
                    return Err(MiscError::AlreadyRegistered(minor));
                }
                minor
            }
            MinorRequest::Dynamic => inner
                .minors
                .allocate_dynamic()
                .map_err(|_| MiscError::AllocationExhausted)?,
        };
        inner.minors.mark_used(minor);

        let dev = DevNum::new(self.config.major, minor);
        let node = self
            .namespace
            .create(self.config.class_name, dev, device, device.preferred_name())
            .map_err(|error| MiscError::DeviceCreateFailed { minor, error })?;

        device.link(minor);
        inner.devices.insert_front(Linked {
            device: Arc::clone(device),
            minor,
            node,
        });
        Ok(minor)
    }

    /// Removes `device` from the registry and destroys its node.
    ///
    /// Lookups stop finding the device immediately. Files already open on it
    /// keep their operation handles and keep working; the driver learns when
    /// they are gone from [`OpsTable::is_idle`](crate::OpsTable::is_idle).
    ///
    /// # Errors
    ///
    /// [`MiscError::NotRegistered`] if the device is not linked here.
    pub fn deregister(&self, device: &Arc<MiscDevice>) -> Result<(), MiscError> {
        if !device.is_registered() {
            return Err(MiscError::NotRegistered);
        }

        let (minor, released) = {
            let mut inner = self.inner.lock();
            let linked = inner
                .devices
                .remove(device)
                .ok_or(MiscError::NotRegistered)?;
            device.unlink();
            self.namespace
                .destroy(self.config.class_name, DevNum::new(self.config.major, linked.minor));
            let released = inner.minors.release(linked.minor);
            (linked.minor, released)
        };

        kinfo!(
            "misc: deregistered '{}' from minor {minor}{}",
            device.name().unwrap_or(""),
            if released { " (minor freed)" } else { "" }
        );
        Ok(())
    }

    /// Returns the device currently registered at `minor`.
    pub fn lookup(&self, minor: u32) -> Option<Arc<MiscDevice>> {
        self.inner
            .lock()
            .devices
            .find(minor)
            .map(|l| Arc::clone(&l.device))
    }

    /// Looks up `minor` and pins its operation table in one critical section.
    ///
    /// A device whose table is retired counts as absent.
    pub(crate) fn acquire_ops(&self, minor: u32) -> Option<OpsHandle> {
        self.inner
            .lock()
            .devices
            .find(minor)
            .and_then(|l| l.device.ops().acquire())
    }

    /// Returns the node handle the namespace gave `minor`'s device.
    pub fn node(&self, minor: u32) -> Option<NodeHandle> {
        self.inner.lock().devices.find(minor).map(|l| l.node)
    }

    /// Returns `true` if a device is registered at `minor`.
    pub fn contains(&self, minor: u32) -> bool {
        self.inner.lock().devices.find(minor).is_some()
    }

    /// Returns the number of registered devices.
    pub fn len(&self) -> usize {
        self.inner.lock().devices.len()
    }

    /// Returns `true` if no device is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of minors marked taken in the dynamic pool.
    pub fn dynamic_in_use(&self) -> usize {
        self.inner.lock().minors.in_use()
    }

    /// Returns `true` if the dynamic pool has `minor` marked taken.
    pub fn is_minor_reserved(&self, minor: u32) -> bool {
        self.inner.lock().minors.is_used(minor)
    }

    /// Returns `true` while some thread holds the registry lock.
    ///
    /// Diagnostic only: lets collaborators assert they are called unlocked.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Checks that the registry can be torn down.
    ///
    /// Surviving devices are reported, not evicted: their drivers still own
    /// them and must deregister first.
    ///
    /// # Errors
    ///
    /// [`MiscError::Busy`] if any device is still registered.
    pub fn shutdown(&self) -> Result<(), MiscError> {
        let remaining = self.len();
        if remaining > 0 {
            kerr!("misc: shutdown with {remaining} device(s) still registered");
            return Err(MiscError::Busy { remaining });
        }
        kinfo!("misc: shut down");
        Ok(())
    }
}

impl fmt::Debug for MiscRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiscRegistry")
            .field("config", &self.config)
            .field("lock", &self.inner)
            .finish_non_exhaustive()
    }
}


#[cfg(all(test, shuttle))]
mod shuttle_tests {
    use super::*;
    use crate::namespace::{NullLoader, NullNamespace};
    use crate::ops::{FileOperations, OpsTable};
    use shuttle::sync::Arc as ModelArc;
    use shuttle::thread;

    struct Nop;
    impl FileOperations for Nop {}

    fn registry() -> ModelArc<MiscRegistry> {
        ModelArc::new(MiscRegistry::new(
            MiscConfig::DEFAULT.with_dynamic_minors(4),
            Arc::new(NullNamespace),
            Arc::new(NullLoader),
        ))
    }

    #[test]
    fn racing_fixed_registrations_have_one_winner() {
        shuttle::check_random(
            || {
                let reg = registry();
                let handles: alloc::vec::Vec<_> = (0..2)
                    .map(|_| {
                        let reg = ModelArc::clone(&reg);
                        thread::spawn(move || {
                            let dev = Arc::new(MiscDevice::new(
                                MinorRequest::Fixed(5),
                                OpsTable::new("race", Nop),
                            ));
                            reg.register(&dev).is_ok()
                        })
                    })
                    .collect();
                let winners = handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(|won| *won)
                    .count();
                assert_eq!(winners, 1);
                assert_eq!(reg.len(), 1);
            },
            1000,
        );
    }

    #[test]
    fn dynamic_minors_are_never_shared() {
        shuttle::check_random(
            || {
                let reg = registry();
                let handles: alloc::vec::Vec<_> = (0..3)
                    .map(|_| {
                        let reg = ModelArc::clone(&reg);
                        thread::spawn(move || {
                            let dev = Arc::new(MiscDevice::new(
                                MinorRequest::Dynamic,
                                OpsTable::new("dyn", Nop),
                            ));
                            let minor = reg.register(&dev).unwrap();
                            assert!(Arc::ptr_eq(&reg.lookup(minor).unwrap(), &dev));
                            reg.deregister(&dev).unwrap();
                            minor
                        })
                    })
                    .collect();
                for h in handles {
                    assert!(h.join().unwrap() < 4);
                }
                assert!(reg.is_empty());
                assert_eq!(reg.dynamic_in_use(), 0);
            },
            1000,
        );
    }
}
