//! DS18B20 one-wire thermometer via the kernel `w1_therm` text interface
//!
//! The driver answers a read of `w1_slave` with two lines:
//!
//! ```text
//! 5c 01 4b 46 7f ff 04 10 a1 : crc=a1 YES
//! 5c 01 4b 46 7f ff 04 10 a1 t=21750
//! ```
//!
//! The kernel runs the conversion during the read, so a sample blocks a
//! blocking-pool thread for up to [`CONVERSION_TIME`].

use crate::bus::{OneWireBus, SharedBus};
use crate::error::{ConfigError, DecodeError, SensorError};
use crate::poller::{PollingConfig, Sensor};
use crate::reading::{Location, Measurement};
use std::time::Duration;

/// 12-bit resolution conversion.
pub const CONVERSION_TIME: Duration = Duration::from_millis(750);

const TEMPERATURE_PREFIX: &str = "t=";

pub struct Ds18b20<B> {
    bus: SharedBus<B>,
    device: String,
    source_id: String,
    location: Location,
    polling: PollingConfig,
}

impl<B: OneWireBus + 'static> Ds18b20<B> {
    /// Use the first device enumerated on the bus.
    pub fn new(
        bus: SharedBus<B>,
        location: Location,
        polling: PollingConfig,
    ) -> Result<Self, SensorError> {
        polling.validate(CONVERSION_TIME)?;
        let devices = bus.transaction(|bus| bus.list_devices())?;
        let device = devices.into_iter().next().ok_or(ConfigError::NoDevices)?;
        Ok(Self::build(bus, device, location, polling))
    }

    /// Use a specific device, e.g. `28-3c01d607d4b2`.
    pub fn with_device(
        bus: SharedBus<B>,
        device: &str,
        location: Location,
        polling: PollingConfig,
    ) -> Result<Self, SensorError> {
        polling.validate(CONVERSION_TIME)?;
        let devices = bus.transaction(|bus| bus.list_devices())?;
        if !devices.iter().any(|d| d == device) {
            return Err(ConfigError::DeviceNotFound {
                device: device.to_string(),
            }
            .into());
        }
        Ok(Self::build(bus, device.to_string(), location, polling))
    }

    fn build(bus: SharedBus<B>, device: String, location: Location, polling: PollingConfig) -> Self {
        tracing::debug!("DS18B20 {} on {}", device, bus.name());
        Self {
            source_id: format!("DS18B20-ID{}", device),
            bus,
            device,
            location,
            polling,
        }
    }
}

impl<B: OneWireBus + 'static> Sensor for Ds18b20<B> {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    fn conversion_time(&self) -> Duration {
        CONVERSION_TIME
    }

    async fn sample(&mut self) -> Result<Vec<Measurement>, SensorError> {
        let device = self.device.clone();
        let response = self.bus.run(move |bus| bus.read_response(&device)).await?;
        let text = std::str::from_utf8(&response).map_err(|_| DecodeError::InvalidText {
            device: self.device.clone(),
        })?;
        let millidegrees = parse_w1_slave(&self.device, text)?;
        Ok(vec![Measurement::celsius(f64::from(millidegrees) / 1000.0)])
    }
}

/// Extract the `t=` value (millidegrees Celsius) from a `w1_slave` response.
pub fn parse_w1_slave(device: &str, text: &str) -> Result<i32, DecodeError> {
    let lines: Vec<&str> = text.lines().collect();
    let [crc_line, data_line, ..] = &lines[..] else {
        return Err(DecodeError::MissingLines {
            device: device.to_string(),
            expected: 2,
            got: lines.len(),
        });
    };

    if crc_line.split_whitespace().last() == Some("NO") {
        return Err(DecodeError::CrcMismatch {
            line: crc_line.to_string(),
        });
    }

    let field = data_line.split_whitespace().last().unwrap_or_default();
    let numeral = field
        .strip_prefix(TEMPERATURE_PREFIX)
        .ok_or_else(|| DecodeError::MissingTemperatureField {
            line: data_line.to_string(),
        })?;
    numeral.parse().map_err(|_| DecodeError::InvalidNumeral {
        value: numeral.to_string(),
    })
}
