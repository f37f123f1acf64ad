//! Snapshot of the registered devices for diagnostics.
//!
//! [`RegistryView`] holds the registry lock for as long as it lives, so the
//! listing is consistent but registration, lookup and open all wait on it.
//! Format it (or iterate it) and drop it promptly.

use core::fmt;

use crate::registry::{MiscRegistry, RegistryInner};
use crate::sync::SpinLockGuard;

/// Locked view over the registered devices, newest first.
pub struct RegistryView<'a> {
    guard: SpinLockGuard<'a, RegistryInner>,
}

impl RegistryView<'_> {
    /// Iterates `(minor, display name)` pairs in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Option<&str>)> + '_ {
        self.guard
            .devices
            .iter()
            .map(|l| (l.minor, l.device.name()))
    }

    /// Returns the number of registered devices.
    pub fn len(&self) -> usize {
        self.guard.devices.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One `"<minor> <name>"` line per device, minor right-aligned to width 3.
impl fmt::Display for RegistryView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (minor, name) in self.iter() {
            writeln!(f, "{minor:>3} {}", name.unwrap_or(""))?;
        }
        Ok(())
    }
}

impl MiscRegistry {
    /// Locks the registry and returns a view over its devices.
    pub fn view(&self) -> RegistryView<'_> {
        RegistryView {
            guard: self.inner.lock(),
        }
    }
}

#[cfg(all(test, not(loom), not(shuttle)))]
mod tests {
    use alloc::sync::Arc;

    use crate::config::MiscConfig;
    use crate::device::MiscDevice;
    use crate::devnum::MinorRequest;
    use crate::namespace::{NullLoader, NullNamespace};
    use crate::ops::{FileOperations, OpsTable};
    use crate::registry::MiscRegistry;

    struct Nop;
    impl FileOperations for Nop {}

    #[test]
    fn listing_is_newest_first_and_aligned() {
        let reg = MiscRegistry::new(
            MiscConfig::DEFAULT.with_dynamic_minors(64),
            Arc::new(NullNamespace),
            Arc::new(NullLoader),
        );
        let psaux = Arc::new(
            MiscDevice::new(MinorRequest::Fixed(1), OpsTable::new("psaux", Nop)).with_name("psaux"),
        );
        let rtc = Arc::new(
            MiscDevice::new(MinorRequest::Fixed(135), OpsTable::new("rtc", Nop)).with_name("rtc"),
        );
        let anon = Arc::new(MiscDevice::new(MinorRequest::Dynamic, OpsTable::new("anon", Nop)));
        reg.register(&psaux).unwrap();
        reg.register(&rtc).unwrap();
        reg.register(&anon).unwrap();

        let view = reg.view();
        assert_eq!(view.len(), 3);
        assert!(reg.is_locked());
        assert_eq!(
            view.iter().collect::<Vec<_>>(),
            [(63, None), (135, Some("rtc")), (1, Some("psaux"))]
        );
        assert_eq!(view.to_string(), " 63 \n135 rtc\n  1 psaux\n");
        drop(view);
        assert!(!reg.is_locked());
    }

    #[test]
    fn empty_listing() {
        let reg = MiscRegistry::new(
            MiscConfig::DEFAULT,
            Arc::new(NullNamespace),
            Arc::new(NullLoader),
        );
        let view = reg.view();
        assert!(view.is_empty());
        assert_eq!(view.to_string(), "");
    }
}
