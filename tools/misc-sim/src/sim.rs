//! In-memory simulation of the misc subsystem.
//!
//! The simulator wires a [`MiscRegistry`] to a node table standing in for
//! devfs and a loader that registers `loadable` drivers when an open misses
//! their minor, then replays a scenario's steps and records one line of
//! output per step.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use hadron_misc::{
    DevNum, DeviceNamespace, DriverError, FileOperations, LoadRequest, MiscDevice, MiscRegistry,
    ModuleLoader, NodeError, NodeHandle, OpenFile, OpenFlags, OpsTable,
};

use crate::config::{DriverSpec, Scenario, Step};

/// Driver behind every simulated device.
struct SimDriver {
    name: String,
    open_error: Option<DriverError>,
}

impl FileOperations for SimDriver {
    fn open(&self, file: &mut OpenFile) -> Result<(), DriverError> {
        if let Some(err) = self.open_error {
            return Err(err);
        }
        file.set_private_data(0usize);
        Ok(())
    }

    /// Fills `buf` with the driver name, repeated.
    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, DriverError> {
        let name = self.name.as_bytes();
        if name.is_empty() {
            return Ok(0);
        }
        let offset = file.private_data_mut::<usize>().ok_or(DriverError::Io)?;
        for byte in buf.iter_mut() {
            *byte = name[*offset % name.len()];
            *offset += 1;
        }
        Ok(buf.len())
    }
}

/// Node table keyed by minor, standing in for devfs.
#[derive(Default)]
pub struct MemNamespace {
    nodes: Mutex<BTreeMap<u32, String>>,
}

impl MemNamespace {
    /// Returns the current `/dev` paths, ordered by minor.
    pub fn nodes(&self) -> Vec<(u32, String)> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(minor, path)| (*minor, path.clone()))
            .collect()
    }
}

impl DeviceNamespace for MemNamespace {
    fn create(
        &self,
        _class: &str,
        dev: DevNum,
        _device: &MiscDevice,
        preferred_name: Option<&str>,
    ) -> Result<NodeHandle, NodeError> {
        let path = match preferred_name {
            Some("") => return Err(NodeError::InvalidName),
            Some(name) => format!("/dev/{name}"),
            None => format!("/dev/misc{}", dev.minor()),
        };
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        if nodes.values().any(|p| *p == path) {
            return Err(NodeError::AlreadyExists);
        }
        nodes.insert(dev.minor(), path);
        Ok(NodeHandle(u64::from(dev.minor())))
    }

    fn destroy(&self, _class: &str, dev: DevNum) {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&dev.minor());
    }
}

/// Devices the simulator created, shared with the loader.
type DeviceMap = Arc<Mutex<HashMap<String, Arc<MiscDevice>>>>;

/// Loader that registers a `loadable` driver declared for the minor.
struct SimLoader {
    registry: Mutex<Weak<MiscRegistry>>,
    loadable: BTreeMap<u32, DriverSpec>,
    devices: DeviceMap,
    requests: Mutex<Vec<String>>,
}

impl ModuleLoader for SimLoader {
    fn request_module(&self, request: &LoadRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.to_string());

        let Some(spec) = self.loadable.get(&request.minor) else {
            return;
        };
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade();
        let Some(registry) = registry else {
            return;
        };
        let device = device_for(spec);
        if registry.register(&device).is_ok() {
            self.devices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(spec.name.clone(), device);
        }
    }
}

fn device_for(spec: &DriverSpec) -> Arc<MiscDevice> {
    let ops = OpsTable::new(
        "misc-sim",
        SimDriver {
            name: spec.name.clone(),
            open_error: spec.open_error.map(DriverError::from),
        },
    );
    let mut device = MiscDevice::new(spec.request(), ops).with_name(spec.name.clone());
    if let Some(node_name) = &spec.node_name {
        device = device.with_node_name(node_name.clone());
    }
    Arc::new(device)
}

/// A registry plus the scenario's drivers and open sessions.
pub struct Simulator {
    registry: Arc<MiscRegistry>,
    namespace: Arc<MemNamespace>,
    loader: Arc<SimLoader>,
    specs: HashMap<String, DriverSpec>,
    devices: DeviceMap,
    sessions: Vec<OpenFile>,
}

impl Simulator {
    /// Builds a simulator for `scenario` with an empty registry.
    pub fn new(scenario: &Scenario) -> Self {
        let namespace = Arc::new(MemNamespace::default());
        let devices = DeviceMap::default();
        let loader = Arc::new(SimLoader {
            registry: Mutex::new(Weak::new()),
            loadable: scenario
                .drivers
                .iter()
                .filter(|d| d.loadable)
                .filter_map(|d| d.request().fixed().map(|minor| (minor, d.clone())))
                .collect(),
            devices: Arc::clone(&devices),
            requests: Mutex::new(Vec::new()),
        });
        let registry = Arc::new(MiscRegistry::new(
            scenario.registry.to_config(),
            namespace.clone(),
            loader.clone(),
        ));
        *loader
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(&registry);

        Self {
            registry,
            namespace,
            loader,
            specs: scenario
                .drivers
                .iter()
                .map(|d| (d.name.clone(), d.clone()))
                .collect(),
            devices,
            sessions: Vec::new(),
        }
    }

    /// Returns the registry under simulation.
    pub fn registry(&self) -> &MiscRegistry {
        &self.registry
    }

    /// Returns the simulated `/dev` nodes.
    pub fn nodes(&self) -> Vec<(u32, String)> {
        self.namespace.nodes()
    }

    /// Returns every load request issued so far.
    pub fn load_requests(&self) -> Vec<String> {
        self.loader
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of open sessions.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Runs every step of `scenario`, returning one output block per step.
    pub fn run(&mut self, scenario: &Scenario) -> Vec<String> {
        scenario.steps.iter().map(|step| self.step(step)).collect()
    }

    /// Performs one step and describes its outcome.
    pub fn step(&mut self, step: &Step) -> String {
        match step {
            Step::Register { driver } => self.register(driver),
            Step::Deregister { driver } => self.deregister(driver),
            Step::Open { minor } => self.open(*minor),
            Step::Read { len } => self.read(*len),
            Step::CloseAll => {
                let count = self.sessions.len();
                for file in self.sessions.drain(..) {
                    file.close();
                }
                format!("close-all: {count} session(s)")
            }
            Step::List => {
                let view = self.registry.view();
                format!("list: {} device(s)\n{view}", view.len())
                    .trim_end()
                    .to_string()
            }
        }
    }

    fn register(&mut self, name: &str) -> String {
        let Some(spec) = self.specs.get(name) else {
            return format!("register {name}: unknown driver");
        };
        let device = self.device(spec);
        match self.registry.register(&device) {
            Ok(minor) => {
                let dev = DevNum::new(self.registry.config().major, minor);
                format!("register {name}: ok, {dev}")
            }
            Err(err) => format!("register {name}: error: {err} ({})", err.errno()),
        }
    }

    fn deregister(&mut self, name: &str) -> String {
        let Some(device) = self.existing(name) else {
            return format!("deregister {name}: error: never registered");
        };
        match self.registry.deregister(&device) {
            Ok(()) => format!("deregister {name}: ok"),
            Err(err) => format!("deregister {name}: error: {err} ({})", err.errno()),
        }
    }

    fn open(&mut self, minor: u32) -> String {
        let mut file = OpenFile::new(OpenFlags::READ);
        match self.registry.open(minor, &mut file) {
            Ok(()) => {
                let owner = file.ops().map_or("", |h| h.table().owner());
                self.sessions.push(file);
                format!("open {minor}: ok ({owner})")
            }
            Err(err) => format!("open {minor}: error: {err} ({})", err.errno()),
        }
    }

    fn read(&mut self, len: usize) -> String {
        let Some(file) = self.sessions.last_mut() else {
            return String::from("read: no open session");
        };
        let mut buf = vec![0u8; len];
        match file.read(&mut buf) {
            Ok(n) => format!("read: {}", String::from_utf8_lossy(&buf[..n])),
            Err(err) => format!("read: error: {err} ({})", err.errno()),
        }
    }

    /// Reuses the device a driver was last registered with, so that a
    /// second `register` of the same driver hits the "already linked" path.
    fn device(&self, spec: &DriverSpec) -> Arc<MiscDevice> {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            devices
                .entry(spec.name.clone())
                .or_insert_with(|| device_for(spec)),
        )
    }

    fn existing(&self, name: &str) -> Option<Arc<MiscDevice>> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        for file in self.sessions.drain(..) {
            file.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulate(toml: &str) -> (Simulator, Vec<String>) {
        let scenario = Scenario::parse(toml).unwrap();
        let mut sim = Simulator::new(&scenario);
        let out = sim.run(&scenario);
        (sim, out)
    }

    #[test]
    fn dynamic_minor_reuse() {
        let (sim, out) = simulate(
            r#"
            [registry]
            dynamic-minors = 8

            [[driver]]
            name = "a"
            minor = 2
            [[driver]]
            name = "b"
            [[driver]]
            name = "c"
            [[driver]]
            name = "d"

            [[step]]
            action = "register"
            driver = "a"
            [[step]]
            action = "register"
            driver = "b"
            [[step]]
            action = "register"
            driver = "c"
            [[step]]
            action = "deregister"
            driver = "b"
            [[step]]
            action = "register"
            driver = "d"
            [[step]]
            action = "list"
            "#,
        );
        assert_eq!(
            out,
            [
                "register a: ok, 10:2",
                "register b: ok, 10:7",
                "register c: ok, 10:6",
                "deregister b: ok",
                "register d: ok, 10:7",
                "list: 3 device(s)\n  7 d\n  6 c\n  2 a",
            ]
        );
        assert_eq!(
            sim.nodes(),
            [
                (2, "/dev/a".to_string()),
                (6, "/dev/c".to_string()),
                (7, "/dev/d".to_string()),
            ]
        );
    }

    #[test]
    fn loadable_driver_appears_on_open() {
        let (sim, out) = simulate(
            r#"
            [[driver]]
            name = "fuse"
            minor = 229
            loadable = true

            [[step]]
            action = "open"
            minor = 229
            [[step]]
            action = "read"
            len = 6
            [[step]]
            action = "open"
            minor = 42
            "#,
        );
        assert_eq!(
            out,
            [
                "open 229: ok (misc-sim)",
                "read: fusefu",
                "open 42: error: no misc device for minor 42 (-19)",
            ]
        );
        assert_eq!(
            sim.load_requests(),
            ["char-major-10-229", "char-major-10-42"]
        );
        assert_eq!(sim.open_sessions(), 1);
        assert!(sim.registry().contains(229));
    }

    #[test]
    fn failing_open_hook_and_node_clash() {
        let (sim, out) = simulate(
            r#"
            [[driver]]
            name = "busy"
            minor = 10
            open-error = "busy"
            [[driver]]
            name = "tun"
            minor = 200
            node-name = "net/tun"
            [[driver]]
            name = "tun2"
            minor = 201
            node-name = "net/tun"

            [[step]]
            action = "register"
            driver = "busy"
            [[step]]
            action = "open"
            minor = 10
            [[step]]
            action = "register"
            driver = "tun"
            [[step]]
            action = "register"
            driver = "tun2"
            [[step]]
            action = "register"
            driver = "tun"
            "#,
        );
        assert_eq!(
            out,
            [
                "register busy: ok, 10:10",
                "open 10: error: driver open failed: device busy (-16)",
                "register tun: ok, 10:200",
                "register tun2: error: failed to create node for misc minor 201: node already exists (-17)",
                "register tun: error: misc minor 200 already registered (-16)",
            ]
        );
        assert_eq!(sim.open_sessions(), 0);
        assert!(sim.registry().is_minor_reserved(10));
    }

    #[test]
    fn deregister_keeps_sessions_alive() {
        let (mut sim, out) = simulate(
            r#"
            [[driver]]
            name = "rtc"
            minor = 135

            [[step]]
            action = "register"
            driver = "rtc"
            [[step]]
            action = "open"
            minor = 135
            [[step]]
            action = "deregister"
            driver = "rtc"
            [[step]]
            action = "read"
            len = 3
            [[step]]
            action = "deregister"
            driver = "rtc"
            "#,
        );
        assert_eq!(
            out,
            [
                "register rtc: ok, 10:135",
                "open 135: ok (misc-sim)",
                "deregister rtc: ok",
                "read: rtc",
                "deregister rtc: error: misc device not registered (-22)",
            ]
        );
        assert_eq!(sim.step(&Step::CloseAll), "close-all: 1 session(s)");
        assert!(sim.nodes().is_empty());
    }
}
