//! scales-sensors: environmental sensor acquisition for the weighing station
//!
//! Device decoders for the BME280 (temperature, pressure, humidity), the
//! DS18B20 (one-wire temperature) and the MCP9600 (thermocouple amplifier
//! cold junction), each polled by its own task into a cancellable stream of
//! [`Reading`]s.
//!
//! Layers:
//! - bus: register/text access contract and per-bus locking
//! - sensors: one decoder per device class
//! - poller: cadence, oversampling, cancellation
//! - linux: `/dev/i2c-N` and `w1` sysfs drivers (feature "linux")

// === Modules ===

pub mod bus;
pub mod config;
pub mod error;
pub mod poller;
pub mod reading;
pub mod sensors;

#[cfg(all(feature = "linux", target_os = "linux"))]
pub mod linux;

pub mod shared;

// === Re-exports ===

pub use bus::{I2cBus, OneWireBus, SharedBus};
pub use error::{BusError, ConfigError, DecodeError, SensorError};
pub use poller::{CycleResult, Oversample, PollingConfig, ReadingStream, Sensor, StopHandle};
pub use reading::{Location, Measurement, Quantity, Reading};
