//! In-memory buses for tests

use super::{I2cBus, OneWireBus};
use crate::error::BusError;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    ReadByte(u16, u8),
    WriteByte(u16, u8, u8),
    ReadWord(u16, u8),
    WritePointer(u16, u8),
    ReadBlock(u16, u8, usize),
}

/// Register file per device address; every operation is logged.
#[derive(Debug, Default)]
pub struct MockI2c {
    pub registers: HashMap<u16, [u8; 256]>,
    pub log: Vec<BusOp>,
    /// When set, every operation fails after being logged.
    pub fail: bool,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, address: u16, register: u8, bytes: &[u8]) {
        let map = self.registers.entry(address).or_insert([0; 256]);
        for (offset, byte) in bytes.iter().enumerate() {
            map[register as usize + offset] = *byte;
        }
    }

    fn get(&self, address: u16, register: usize) -> Result<u8, BusError> {
        if self.fail {
            return Err(nack(address));
        }
        let map = self.registers.get(&address).ok_or_else(|| nack(address))?;
        Ok(map[register & 0xFF])
    }
}

fn nack(address: u16) -> BusError {
    BusError::I2c {
        address,
        message: "no acknowledge".to_string(),
    }
}

impl I2cBus for MockI2c {
    fn read_byte(&mut self, address: u16, register: u8) -> Result<u8, BusError> {
        self.log.push(BusOp::ReadByte(address, register));
        self.get(address, register as usize)
    }

    fn write_byte(&mut self, address: u16, register: u8, value: u8) -> Result<(), BusError> {
        self.log.push(BusOp::WriteByte(address, register, value));
        if self.fail {
            return Err(nack(address));
        }
        self.set(address, register, &[value]);
        Ok(())
    }

    fn read_word(&mut self, address: u16, register: u8) -> Result<u16, BusError> {
        self.log.push(BusOp::ReadWord(address, register));
        let low = self.get(address, register as usize)?;
        let high = self.get(address, register as usize + 1)?;
        Ok(u16::from_le_bytes([low, high]))
    }

    fn write_pointer(&mut self, address: u16, register: u8) -> Result<(), BusError> {
        self.log.push(BusOp::WritePointer(address, register));
        if self.fail {
            return Err(nack(address));
        }
        self.registers.entry(address).or_insert([0; 256]);
        Ok(())
    }

    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.log.push(BusOp::ReadBlock(address, register, buf.len()));
        for (offset, slot) in buf.iter_mut().enumerate() {
            *slot = self.get(address, register as usize + offset)?;
        }
        Ok(())
    }
}

/// One-wire driver returning canned responses per device.
#[derive(Debug, Default)]
pub struct MockOneWire {
    pub devices: Vec<String>,
    pub responses: HashMap<String, Vec<u8>>,
    pub reads: usize,
    pub fail: bool,
    /// Blocks the calling thread for this long on every read, like the
    /// kernel driver does while the conversion runs.
    pub delay: Option<Duration>,
}

impl MockOneWire {
    pub fn with_device(device: &str, lines: &[&str]) -> Self {
        let mut bus = Self::default();
        bus.devices.push(device.to_string());
        bus.respond(device, lines);
        bus
    }

    pub fn respond(&mut self, device: &str, lines: &[&str]) {
        let mut text = lines.join("\n");
        text.push('\n');
        self.respond_bytes(device, text.as_bytes());
    }

    pub fn respond_bytes(&mut self, device: &str, bytes: &[u8]) {
        self.responses.insert(device.to_string(), bytes.to_vec());
    }
}

impl OneWireBus for MockOneWire {
    fn list_devices(&mut self) -> Result<Vec<String>, BusError> {
        Ok(self.devices.clone())
    }

    fn read_response(&mut self, device: &str) -> Result<Vec<u8>, BusError> {
        self.reads += 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(BusError::OneWire {
                target: device.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"),
            });
        }
        Ok(self.responses.get(device).cloned().unwrap_or_default())
    }
}
