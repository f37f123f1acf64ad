//! Misc subsystem configuration.
//!
//! The constants match the traditional misc layout; [`MiscConfig`] bundles
//! them so a registry can be built with a different major or pool size
//! (tests use tiny pools to reach exhaustion quickly).

/// Character major shared by every misc device.
pub const MISC_MAJOR: u32 = 10;

/// Number of minors managed by the dynamic allocator (`0..DYNAMIC_MINORS`).
pub const DYNAMIC_MINORS: usize = 64;

/// Legacy raw minor value meaning "assign me a dynamic minor".
///
/// Only used when translating raw minors; see
/// [`MinorRequest::from_raw`](crate::MinorRequest::from_raw).
pub const MISC_DYNAMIC_MINOR: u32 = 255;

/// Namespace class under which misc device nodes are created.
pub const MISC_CLASS: &str = "misc";

/// Runtime parameters of a [`MiscRegistry`](crate::MiscRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiscConfig {
    /// Major number used for every device node.
    pub major: u32,
    /// Size of the dynamic minor pool. Fixed for the registry's lifetime.
    pub dynamic_minors: usize,
    /// Namespace class passed to the node collaborator.
    pub class_name: &'static str,
    /// Keep minor 0 out of dynamic allocation; only a fixed registration
    /// can claim it.
    pub reserve_minor_zero: bool,
}

impl MiscConfig {
    /// The standard misc configuration.
    pub const DEFAULT: Self = Self {
        major: MISC_MAJOR,
        dynamic_minors: DYNAMIC_MINORS,
        class_name: MISC_CLASS,
        reserve_minor_zero: false,
    };

    /// Returns the configuration with a different pool size.
    #[must_use]
    pub const fn with_dynamic_minors(mut self, dynamic_minors: usize) -> Self {
        self.dynamic_minors = dynamic_minors;
        self
    }

    /// Returns the configuration with a different major number.
    #[must_use]
    pub const fn with_major(mut self, major: u32) -> Self {
        self.major = major;
        self
    }

    /// Returns the configuration with the minor-0 reservation toggled.
    #[must_use]
    pub const fn with_reserve_minor_zero(mut self, reserve: bool) -> Self {
        self.reserve_minor_zero = reserve;
        self
    }
}

impl Default for MiscConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(all(test, not(loom), not(shuttle)))]
mod tests {
    use super::*;

    #[test]
    fn default_matches_constants() {
        let cfg = MiscConfig::default();
        assert_eq!(cfg.major, MISC_MAJOR);
        assert_eq!(cfg.dynamic_minors, DYNAMIC_MINORS);
        assert_eq!(cfg.class_name, "misc");
        assert!(!cfg.reserve_minor_zero);
    }

    #[test]
    fn builders_override_single_fields() {
        let cfg = MiscConfig::DEFAULT
            .with_dynamic_minors(8)
            .with_major(42)
            .with_reserve_minor_zero(true);
        assert_eq!(cfg.dynamic_minors, 8);
        assert_eq!(cfg.major, 42);
        assert!(cfg.reserve_minor_zero);
        assert_eq!(cfg.class_name, MISC_CLASS);
    }
}
