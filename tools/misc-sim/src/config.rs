//! Scenario loading.
//!
//! A scenario is a TOML file with an optional `[registry]` table, a list of
//! `[[driver]]` declarations, and a list of `[[step]]` actions run in order:
//!
//! ```toml
//! [registry]
//! dynamic-minors = 8
//!
//! [[driver]]
//! name = "watchdog"
//! minor = 130
//!
//! [[step]]
//! action = "register"
//! driver = "watchdog"
//!
//! [[step]]
//! action = "open"
//! minor = 130
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use hadron_misc::config::MISC_DYNAMIC_MINOR;
use hadron_misc::{DriverError, MinorRequest, MiscConfig};
use serde::Deserialize;

/// A parsed and validated scenario.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Registry configuration.
    #[serde(default)]
    pub registry: RegistrySection,
    /// Drivers the scenario knows about.
    #[serde(default, rename = "driver")]
    pub drivers: Vec<DriverSpec>,
    /// Actions to perform.
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// The `[registry]` table. Missing keys take the kernel defaults.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RegistrySection {
    /// Misc major number.
    pub major: u32,
    /// Size of the dynamic minor pool.
    pub dynamic_minors: usize,
    /// Keep minor 0 out of dynamic allocation.
    pub reserve_minor_zero: bool,
}

impl Default for RegistrySection {
    fn default() -> Self {
        let config = MiscConfig::DEFAULT;
        Self {
            major: config.major,
            dynamic_minors: config.dynamic_minors,
            reserve_minor_zero: config.reserve_minor_zero,
        }
    }
}

impl RegistrySection {
    /// Returns the registry configuration this section describes.
    pub fn to_config(&self) -> MiscConfig {
        MiscConfig::DEFAULT
            .with_major(self.major)
            .with_dynamic_minors(self.dynamic_minors)
            .with_reserve_minor_zero(self.reserve_minor_zero)
    }
}

/// A `[[driver]]` declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DriverSpec {
    /// Display name, also used to refer to the driver from steps.
    pub name: String,
    /// Fixed minor; omitted (or 255) asks for a dynamic one.
    pub minor: Option<u32>,
    /// Node name override, e.g. `"net/tun"`.
    pub node_name: Option<String>,
    /// Registered on demand when an open misses its minor.
    #[serde(default)]
    pub loadable: bool,
    /// Make the driver's open hook fail with this error.
    pub open_error: Option<OpenFailure>,
}

impl DriverSpec {
    /// Returns the minor request this driver registers with.
    pub fn request(&self) -> MinorRequest {
        self.minor
            .map_or(MinorRequest::Dynamic, MinorRequest::from_raw)
    }
}

/// Errors a simulated open hook can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenFailure {
    /// `EBUSY`.
    Busy,
    /// `EPERM`.
    PermissionDenied,
    /// `ENODEV`.
    NoDevice,
    /// `EINVAL`.
    InvalidArgument,
    /// `EAGAIN`.
    WouldBlock,
    /// `EIO`.
    Io,
}

impl From<OpenFailure> for DriverError {
    fn from(failure: OpenFailure) -> Self {
        match failure {
            OpenFailure::Busy => Self::Busy,
            OpenFailure::PermissionDenied => Self::PermissionDenied,
            OpenFailure::NoDevice => Self::NoDevice,
            OpenFailure::InvalidArgument => Self::InvalidArgument,
            OpenFailure::WouldBlock => Self::WouldBlock,
            OpenFailure::Io => Self::Io,
        }
    }
}

/// One scenario action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    /// Register a declared driver.
    Register {
        /// Driver name.
        driver: String,
    },
    /// Deregister a declared driver.
    Deregister {
        /// Driver name.
        driver: String,
    },
    /// Open a minor and keep the session until the scenario ends.
    Open {
        /// Minor to open.
        minor: u32,
    },
    /// Read from the most recent open session.
    Read {
        /// Number of bytes to read.
        #[serde(default = "default_read_len")]
        len: usize,
    },
    /// Close every open session.
    CloseAll,
    /// Print the registry listing.
    List,
}

fn default_read_len() -> usize {
    8
}

impl Scenario {
    /// Reads and validates a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    /// Parses and validates scenario text.
    pub fn parse(content: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(content).context("Failed to parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Looks up a driver declaration by name.
    pub fn driver(&self, name: &str) -> Option<&DriverSpec> {
        self.drivers.iter().find(|d| d.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.registry.dynamic_minors == 0 {
            bail!("registry.dynamic-minors must be at least 1");
        }
        if self.registry.dynamic_minors > MISC_DYNAMIC_MINOR as usize {
            bail!(
                "registry.dynamic-minors must be at most {MISC_DYNAMIC_MINOR}, got {}",
                self.registry.dynamic_minors
            );
        }

        let mut names = HashSet::new();
        for driver in &self.drivers {
            if !names.insert(driver.name.as_str()) {
                bail!("driver '{}' declared twice", driver.name);
            }
            if driver.loadable && driver.request() == MinorRequest::Dynamic {
                bail!("loadable driver '{}' needs a fixed minor", driver.name);
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Register { driver } | Step::Deregister { driver } = step {
                if self.driver(driver).is_none() {
                    bail!("step {}: unknown driver '{driver}'", index + 1);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scenario_uses_kernel_defaults() {
        let scenario = Scenario::parse("").unwrap();
        let config = scenario.registry.to_config();
        assert_eq!(config, MiscConfig::DEFAULT);
        assert!(scenario.drivers.is_empty());
        assert!(scenario.steps.is_empty());
    }

    #[test]
    fn parses_drivers_and_steps() {
        let scenario = Scenario::parse(
            r#"
            [registry]
            dynamic-minors = 8

            [[driver]]
            name = "tun"
            minor = 200
            node-name = "net/tun"

            [[driver]]
            name = "anon"
            minor = 255

            [[driver]]
            name = "fuse"
            minor = 229
            loadable = true
            open-error = "busy"

            [[step]]
            action = "register"
            driver = "tun"

            [[step]]
            action = "open"
            minor = 229

            [[step]]
            action = "read"

            [[step]]
            action = "close-all"

            [[step]]
            action = "list"
            "#,
        )
        .unwrap();

        assert_eq!(scenario.registry.dynamic_minors, 8);
        assert_eq!(scenario.registry.major, 10);
        let tun = scenario.driver("tun").unwrap();
        assert_eq!(tun.request(), MinorRequest::Fixed(200));
        assert_eq!(tun.node_name.as_deref(), Some("net/tun"));
        assert_eq!(scenario.driver("anon").unwrap().request(), MinorRequest::Dynamic);
        let fuse = scenario.driver("fuse").unwrap();
        assert!(fuse.loadable);
        assert_eq!(fuse.open_error, Some(OpenFailure::Busy));

        assert_eq!(
            scenario.steps,
            [
                Step::Register {
                    driver: "tun".into()
                },
                Step::Open { minor: 229 },
                Step::Read { len: 8 },
                Step::CloseAll,
                Step::List,
            ]
        );
    }

    #[test]
    fn rejects_unknown_driver_in_step() {
        let err = Scenario::parse(
            r#"
            [[step]]
            action = "register"
            driver = "ghost"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("unknown driver 'ghost'"));
    }

    #[test]
    fn rejects_duplicate_driver_names() {
        let err = Scenario::parse(
            r#"
            [[driver]]
            name = "rtc"
            minor = 135

            [[driver]]
            name = "rtc"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("declared twice"));
    }

    #[test]
    fn rejects_dynamic_loadable_driver() {
        let err = Scenario::parse(
            r#"
            [[driver]]
            name = "lazy"
            loadable = true
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("needs a fixed minor"));
    }

    #[test]
    fn rejects_bad_pool_size() {
        assert!(Scenario::parse("[registry]\ndynamic-minors = 0\n").is_err());
        assert!(Scenario::parse("[registry]\ndynamic-minors = 4096\n").is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Scenario::parse("[registry]\nmajors = 3\n").is_err());
    }
}
