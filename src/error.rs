//! Error taxonomy for bus access, decoding and sensor configuration

use std::time::Duration;
use thiserror::Error;

/// Communication failures on an I2C or one-wire bus.
///
/// These are transient from the engine's point of view: a failed cycle is
/// published on the stream and polling continues.
#[derive(Debug, Error)]
pub enum BusError {
    /// An SMBus/I2C transfer with a device failed (no ACK, timeout, ...).
    #[error("I2C transfer with device {address:#04x} failed: {message}")]
    I2c { address: u16, message: String },

    /// A block read returned fewer bytes than requested.
    #[error("short block read from device {address:#04x}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        address: u16,
        wanted: usize,
        got: usize,
    },

    /// Reading from the one-wire driver failed.
    #[error("one-wire read of {target} failed: {source}")]
    OneWire {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A previous transaction panicked while holding the bus.
    #[error("bus {bus} is poisoned by a panicked transaction")]
    Poisoned { bus: String },

    /// The blocking-pool task running a transaction panicked or was cancelled.
    #[error("transaction task on {bus} failed: {message}")]
    Task { bus: String, message: String },
}

/// Malformed device responses.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("expected at least {expected} lines from {device}, got {got}")]
    MissingLines {
        device: String,
        expected: usize,
        got: usize,
    },

    #[error("response from {device} is not valid text")]
    InvalidText { device: String },

    #[error("no `t=` field at the end of {line:?}")]
    MissingTemperatureField { line: String },

    #[error("temperature field {value:?} is not an integer")]
    InvalidNumeral { value: String },

    #[error("one-wire CRC check failed: {line:?}")]
    CrcMismatch { line: String },

    #[error("oversampled measurements disagree at position {index}")]
    InconsistentSamples { index: usize },

    #[error("sensor produced no measurements")]
    EmptySample,
}

/// Construction-time configuration problems. Never raised mid-stream.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error(
        "update interval {requested:?} is shorter than the {required:?} needed for {samples} sample(s)"
    )]
    IntervalTooShort {
        requested: Duration,
        required: Duration,
        samples: u32,
    },

    #[error("update interval must be a positive, finite duration")]
    InvalidInterval,

    #[error("oversampling needs at least one iteration")]
    ZeroIterations,

    #[error("no devices found on one-wire bus")]
    NoDevices,

    #[error("one-wire device {device} is not present on the bus")]
    DeviceNotFound { device: String },

    #[error("device address {address:#04x} is not one this sensor answers on")]
    UnsupportedAddress { address: u16 },

    #[error("unexpected chip id {found:#04x} at address {address:#04x} (expected {expected:#04x})")]
    UnexpectedChipId {
        address: u16,
        expected: u8,
        found: u8,
    },
}

/// Top-level error carried by reading streams and returned by sensor constructors.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("communication error: {0}")]
    Communication(#[from] BusError),

    #[error("protocol decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl SensorError {
    /// True for errors that can only happen while constructing a sensor.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SensorError::Configuration(_))
    }
}
