//! Open dispatch for the misc major.
//!
//! Every misc minor shares one char-device entry; the first `open` on a
//! session finds the owning driver, binds its operations to the file, and
//! runs the driver's open hook. From then on the file talks to the driver
//! directly.

use crate::devnum::DevNum;
use crate::error::OpenError;
use crate::file::OpenFile;
use crate::namespace::LoadRequest;
use crate::ops::OpsHandle;
use crate::registry::MiscRegistry;
use crate::{kdebug, ktrace};

impl MiscRegistry {
    /// Opens `minor` on `file`.
    ///
    /// If no driver holds the minor, the module loader is asked for
    /// `char-major-<major>-<minor>` (without the registry lock) and the
    /// lookup is retried once. On a hit the driver's operations become the
    /// file's active table and its open hook runs, also without the lock.
    ///
    /// When the hook fails the file gets its previous table back and the new
    /// handle is released; on success the previous table is released
    /// instead. Either way exactly one handle stays with the file.
    ///
    /// # Errors
    ///
    /// - [`OpenError::NoSuchDevice`] if no driver appears for `minor`. The
    ///   file is not touched.
    /// - [`OpenError::Driver`] with the open hook's error.
    pub fn open(&self, minor: u32, file: &mut OpenFile) -> Result<(), OpenError> {
        let handle = self.find_or_load(minor)?;
        let ops = handle.ops_ref();

        let previous_dev = file.replace_dev(Some(DevNum::new(self.config().major, minor)));
        let previous_ops = file.replace_ops(Some(handle));

        match ops.open(file) {
            Ok(()) => {
                drop(previous_ops);
                ktrace!("misc: opened minor {minor} ({})", ops_owner(file));
                Ok(())
            }
            Err(err) => {
                drop(file.replace_ops(previous_ops));
                file.replace_dev(previous_dev);
                kdebug!("misc: open hook for minor {minor} failed: {err}");
                Err(OpenError::Driver(err))
            }
        }
    }

    fn find_or_load(&self, minor: u32) -> Result<OpsHandle, OpenError> {
        if let Some(handle) = self.acquire_ops(minor) {
            return Ok(handle);
        }

        let request = LoadRequest {
            major: self.config().major,
            minor,
        };
        kdebug!("misc: no driver for minor {minor}, requesting {request}");
        self.loader.request_module(&request);

        self.acquire_ops(minor).ok_or_else(|| {
            kdebug!("misc: still no driver for minor {minor} after {request}");
            OpenError::NoSuchDevice(minor)
        })
    }
}

fn ops_owner(file: &OpenFile) -> &'static str {
    file.ops().map_or("", |h| h.table().owner())
}
