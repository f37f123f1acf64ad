//! Misc character device registry for the Hadron kernel.
//!
//! Small drivers that do not deserve a major number of their own (watchdogs,
//! RNGs, FUSE, uinput, ...) register a [`MiscDevice`] here under a minor of
//! the shared misc major. The registry hands out dynamic minors on request,
//! creates device nodes through a [`DeviceNamespace`], and routes `open` on
//! any misc minor to the owning driver's [`FileOperations`] at first access.
//!
//! Opening a minor with no driver asks the [`ModuleLoader`] to load one and
//! retries the lookup exactly once before failing with
//! [`OpenError::NoSuchDevice`].
//!
//! The crate is host-testable: plain `cargo test`,
//! `--cfg loom` model checking, and `--cfg shuttle` randomized scheduling.

#![cfg_attr(not(any(test, loom, shuttle)), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod device;
pub mod devnum;
mod dispatch;
pub mod error;
pub mod file;
pub mod log;
pub mod minors;
pub mod namespace;
pub mod ops;
pub mod registry;
pub mod sync;
pub mod view;

pub use config::MiscConfig;
pub use device::MiscDevice;
pub use devnum::{DevNum, MinorRequest};
pub use error::{DriverError, MiscError, NodeError, OpenError};
pub use file::{OpenFile, OpenFlags};
pub use namespace::{
    DeviceNamespace, LoadRequest, ModuleLoader, NodeHandle, NullLoader, NullNamespace,
};
pub use ops::{FileOperations, OpsHandle, OpsTable};
pub use registry::MiscRegistry;
pub use view::RegistryView;
