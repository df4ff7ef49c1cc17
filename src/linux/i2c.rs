//! I2C through the kernel `i2c-dev` interface

use crate::bus::I2cBus;
use crate::error::BusError;
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One adapter, e.g. `/dev/i2c-1`. A handle per slave address is opened on
/// first use and kept.
pub struct LinuxI2c {
    path: PathBuf,
    devices: HashMap<u16, LinuxI2CDevice>,
}

impl LinuxI2c {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            devices: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn device(&mut self, address: u16) -> Result<&mut LinuxI2CDevice, BusError> {
        match self.devices.entry(address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let device = LinuxI2CDevice::new(&self.path, address)
                    .map_err(|e| transfer_error(address, e))?;
                tracing::debug!("Opened {:?} for device {:#04x}", self.path, address);
                Ok(entry.insert(device))
            }
        }
    }
}

fn transfer_error(address: u16, e: LinuxI2CError) -> BusError {
    BusError::I2c {
        address,
        message: e.to_string(),
    }
}

impl I2cBus for LinuxI2c {
    fn read_byte(&mut self, address: u16, register: u8) -> Result<u8, BusError> {
        self.device(address)?
            .smbus_read_byte_data(register)
            .map_err(|e| transfer_error(address, e))
    }

    fn write_byte(&mut self, address: u16, register: u8, value: u8) -> Result<(), BusError> {
        self.device(address)?
            .smbus_write_byte_data(register, value)
            .map_err(|e| transfer_error(address, e))
    }

    fn read_word(&mut self, address: u16, register: u8) -> Result<u16, BusError> {
        self.device(address)?
            .smbus_read_word_data(register)
            .map_err(|e| transfer_error(address, e))
    }

    fn write_pointer(&mut self, address: u16, register: u8) -> Result<(), BusError> {
        self.device(address)?
            .smbus_write_byte(register)
            .map_err(|e| transfer_error(address, e))
    }

    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let wanted = buf.len();
        // SMBus block transfers carry at most 32 bytes.
        let len = u8::try_from(wanted).map_err(|_| BusError::ShortRead {
            address,
            wanted,
            got: 0,
        })?;
        let data = self
            .device(address)?
            .smbus_read_i2c_block_data(register, len)
            .map_err(|e| transfer_error(address, e))?;
        if data.len() < wanted {
            return Err(BusError::ShortRead {
                address,
                wanted,
                got: data.len(),
            });
        }
        buf.copy_from_slice(&data[..wanted]);
        Ok(())
    }
}
