//! One-wire through the kernel `w1` sysfs tree

use crate::bus::OneWireBus;
use crate::error::BusError;
use std::fs;
use std::path::PathBuf;

pub const MASTER: &str = "w1_bus_master1";

/// What the master writes to `w1_master_slaves` when the bus is empty.
const NO_SLAVES: &str = "not found.";

/// Devices under `root` (normally `/sys/bus/w1/devices`), enumerated by the
/// first bus master.
pub struct SysfsOneWire {
    root: PathBuf,
}

impl SysfsOneWire {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(path: PathBuf) -> Result<Vec<u8>, BusError> {
        fs::read(&path).map_err(|source| BusError::OneWire {
            target: path.display().to_string(),
            source,
        })
    }
}

impl OneWireBus for SysfsOneWire {
    fn list_devices(&mut self) -> Result<Vec<String>, BusError> {
        let listing = Self::read(self.root.join(MASTER).join("w1_master_slaves"))?;
        Ok(String::from_utf8_lossy(&listing)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && *line != NO_SLAVES)
            .map(str::to_string)
            .collect())
    }

    fn read_response(&mut self, device: &str) -> Result<Vec<u8>, BusError> {
        Self::read(self.root.join(device).join("w1_slave"))
    }
}
