//! BME280 combined temperature, pressure and humidity sensor (I2C)

pub mod calibration;
pub mod compensation;

use crate::bus::{I2cBus, SharedBus};
use crate::error::{ConfigError, SensorError};
use crate::poller::{PollingConfig, Sensor};
use crate::reading::{Location, Measurement};
use calibration::Calibration;
use compensation::{RawFrame, DATA_LEN, DATA_START};
use std::time::Duration;

pub use compensation::Compensated;

const REG_CHIP_ID: u8 = 0xD0;
const CHIP_ID: u8 = 0x60;
const REG_RESET: u8 = 0xE0;
const RESET_COMMAND: u8 = 0xB6;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_CTRL_MEAS: u8 = 0xF4;

/// Humidity oversampling x4. Only latched by the next `ctrl_meas` write.
const CTRL_HUM: u8 = 0b011;
/// Temperature x4, pressure x4, forced mode.
const CTRL_MEAS: u8 = 0b011_011_10;

pub const CONVERSION_TIME: Duration = Duration::from_millis(100);
pub const RESET_SETTLE: Duration = Duration::from_millis(100);

/// The two addresses selectable with the SDO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Address {
    /// SDO tied to GND.
    #[default]
    Primary,
    /// SDO tied to VDDIO.
    Secondary,
}

impl Address {
    pub fn value(self) -> u16 {
        match self {
            Address::Primary => 0x76,
            Address::Secondary => 0x77,
        }
    }
}

impl TryFrom<u16> for Address {
    type Error = ConfigError;

    fn try_from(address: u16) -> Result<Self, Self::Error> {
        match address {
            0x76 => Ok(Address::Primary),
            0x77 => Ok(Address::Secondary),
            _ => Err(ConfigError::UnsupportedAddress { address }),
        }
    }
}

pub struct Bme280<B> {
    bus: SharedBus<B>,
    address: u16,
    source_id: String,
    location: Location,
    polling: PollingConfig,
    calibration: Calibration,
}

impl<B: I2cBus + 'static> Bme280<B> {
    /// Probe, reset and calibrate the device.
    ///
    /// The reset settle time is awaited, so this must run on a tokio runtime.
    pub async fn new(
        bus: SharedBus<B>,
        address: Address,
        location: Location,
        polling: PollingConfig,
    ) -> Result<Self, SensorError> {
        polling.validate(CONVERSION_TIME)?;
        let address = address.value();

        let found = bus
            .run(move |bus| bus.read_byte(address, REG_CHIP_ID))
            .await?;
        if found != CHIP_ID {
            return Err(ConfigError::UnexpectedChipId {
                address,
                expected: CHIP_ID,
                found,
            }
            .into());
        }

        bus.run(move |bus| bus.write_byte(address, REG_RESET, RESET_COMMAND))
            .await?;
        tokio::time::sleep(RESET_SETTLE).await;

        let calibration = bus
            .run(move |bus| Calibration::read(bus, address))
            .await?;
        tracing::debug!("BME280 at {:#04x} on {}: {:?}", address, bus.name(), calibration);

        Ok(Self {
            bus,
            address,
            source_id: format!("BME280-ID{}", address),
            location,
            polling,
            calibration,
        })
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Trigger one forced conversion and read back the raw codes.
    async fn measure(&self) -> Result<RawFrame, SensorError> {
        let address = self.address;
        self.bus
            .run(move |bus| {
                bus.write_byte(address, REG_CTRL_HUM, CTRL_HUM)?;
                bus.write_byte(address, REG_CTRL_MEAS, CTRL_MEAS)
            })
            .await?;

        tokio::time::sleep(CONVERSION_TIME).await;

        let data = self
            .bus
            .run(move |bus| {
                let mut data = [0u8; DATA_LEN];
                bus.read_block(address, DATA_START, &mut data)?;
                Ok(data)
            })
            .await?;
        Ok(RawFrame::from_registers(&data))
    }
}

impl<B: I2cBus + 'static> Sensor for Bme280<B> {
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
        let frame = self.measure().await?;
        let values = self.calibration.compensate(&frame);
        if values.pressure_hpa == 0.0 {
            tracing::warn!(
                "{}: pressure compensation divisor is zero, reporting 0 hPa",
                self.source_id
            );
        }
        Ok(vec![
            Measurement::celsius(values.temperature_celsius),
            Measurement::hectopascal(values.pressure_hpa),
            Measurement::relative_humidity(values.humidity_percent),
        ])
    }
}
