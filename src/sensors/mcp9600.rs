//! MCP9600 thermocouple amplifier, cold-junction (ambient) temperature

use crate::bus::{I2cBus, SharedBus};
use crate::error::SensorError;
use crate::poller::{PollingConfig, Sensor};
use crate::reading::{Location, Measurement};
use std::time::Duration;

pub const DEFAULT_ADDRESS: u16 = 0x67;

const REG_COLD_JUNCTION: u8 = 0x02;
const REG_DEVICE_CONFIG: u8 = 0x06;

/// °C per LSB of the temperature registers.
const RESOLUTION: f64 = 0.0625;

/// 18-bit ADC conversion.
pub const CONVERSION_TIME: Duration = Duration::from_millis(320);

pub struct Mcp9600<B> {
    bus: SharedBus<B>,
    address: u16,
    source_id: String,
    location: Location,
    polling: PollingConfig,
}

impl<B: I2cBus + 'static> Mcp9600<B> {
    /// Puts the device in normal mode with default settings.
    pub fn new(
        bus: SharedBus<B>,
        address: u16,
        location: Location,
        polling: PollingConfig,
    ) -> Result<Self, SensorError> {
        polling.validate(CONVERSION_TIME)?;
        bus.transaction(|bus| bus.write_byte(address, REG_DEVICE_CONFIG, 0x00))?;
        Ok(Self {
            bus,
            address,
            source_id: format!("MCP9600-ID{}", address),
            location,
            polling,
        })
    }
}

impl<B: I2cBus + 'static> Sensor for Mcp9600<B> {
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
        let address = self.address;
        let word = self
            .bus
            .run(move |bus| {
                bus.write_pointer(address, REG_COLD_JUNCTION)?;
                bus.read_word(address, REG_COLD_JUNCTION)
            })
            .await?;
        Ok(vec![Measurement::celsius(decode_temperature_word(word))])
    }
}

/// The device sends the register MSB first; SMBus word reads are LSB first.
pub fn decode_temperature_word(word: u16) -> f64 {
    f64::from(word.swap_bytes() as i16) * RESOLUTION
}
