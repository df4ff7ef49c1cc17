//! Bus access contract - the primitives device decoders are written against
//!
//! The traits are synchronous: a call blocks until the transfer completes.
//! [`SharedBus`] serializes multi-step transactions on one physical bus so
//! that concurrent polling tasks cannot interleave a register-pointer write
//! with another device's read. From async code, [`SharedBus::run`] moves the
//! transaction onto tokio's blocking pool.

#[cfg(test)]
pub(crate) mod mock;

use crate::error::BusError;
use std::sync::{Arc, Mutex};

/// Byte/word register access over an addressed serial bus (SMBus semantics).
pub trait I2cBus: Send {
    fn read_byte(&mut self, address: u16, register: u8) -> Result<u8, BusError>;

    fn write_byte(&mut self, address: u16, register: u8, value: u8) -> Result<(), BusError>;

    /// SMBus "read word": the byte at `register` is the low byte of the
    /// result, the byte at `register + 1` the high byte.
    ///
    /// Devices that transmit big-endian words must swap the result.
    fn read_word(&mut self, address: u16, register: u8) -> Result<u16, BusError>;

    /// Single-byte write with no data, which selects the device's register pointer.
    fn write_pointer(&mut self, address: u16, register: u8) -> Result<(), BusError>;

    /// Burst read of `buf.len()` consecutive registers starting at `register`.
    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<(), BusError>;
}

/// Text-oriented access to a one-wire bus driver.
pub trait OneWireBus: Send {
    /// Identifiers of the devices currently enumerated on the bus.
    fn list_devices(&mut self) -> Result<Vec<String>, BusError>;

    /// The driver's raw response for one device.
    fn read_response(&mut self, device: &str) -> Result<Vec<u8>, BusError>;
}

/// A physical bus shared between sensors.
///
/// Clones refer to the same bus and the same lock. Transactions run
/// synchronously under the lock, so a guard can never be held across an
/// `.await` (or survive a cancelled polling task).
pub struct SharedBus<B> {
    name: Arc<str>,
    inner: Arc<Mutex<B>>,
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> SharedBus<B> {
    pub fn new(name: impl Into<String>, bus: B) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` with exclusive access to the bus.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut B) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let mut bus = self.inner.lock().map_err(|_| BusError::Poisoned {
            bus: self.name.to_string(),
        })?;
        f(&mut bus)
    }
}

impl<B: Send + 'static> SharedBus<B> {
    /// [`transaction`](Self::transaction) on the blocking pool, so a slow
    /// transfer never holds up a runtime worker.
    pub async fn run<T, F>(&self, f: F) -> Result<T, BusError>
    where
        T: Send + 'static,
        F: FnOnce(&mut B) -> Result<T, BusError> + Send + 'static,
    {
        let bus = self.clone();
        tokio::task::spawn_blocking(move || bus.transaction(f))
            .await
            .map_err(|e| BusError::Task {
                bus: self.name.to_string(),
                message: e.to_string(),
            })?
    }
}

impl<B> std::fmt::Debug for SharedBus<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBus").field("name", &self.name).finish()
    }
}
