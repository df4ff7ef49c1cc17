//! Configuration module for the sensor set
//!
//! Reads/writes sensor configuration from ~/.config/scales-sensors/sensors.toml

use crate::error::ConfigError;
use crate::poller::{Oversample, PollingConfig};
use crate::reading::Location;
use crate::sensors::{bme280, ds18b20, mcp9600};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";
pub const DEFAULT_W1_ROOT: &str = "/sys/bus/w1/devices";

fn default_interval_secs() -> f64 {
    60.0
}

// === Sensor entries ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Bme280,
    Ds18b20,
    Mcp9600,
}

impl SensorKind {
    pub fn conversion_time(self) -> Duration {
        match self {
            SensorKind::Bme280 => bme280::CONVERSION_TIME,
            SensorKind::Ds18b20 => ds18b20::CONVERSION_TIME,
            SensorKind::Mcp9600 => mcp9600::CONVERSION_TIME,
        }
    }

    pub fn is_one_wire(self) -> bool {
        matches!(self, SensorKind::Ds18b20)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Bme280 => "bme280",
            SensorKind::Ds18b20 => "ds18b20",
            SensorKind::Mcp9600 => "mcp9600",
        }
    }
}

/// One `[[sensor]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub kind: SensorKind,
    /// I2C adapter path or one-wire sysfs root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<u16>,
    /// One-wire device id (first on the bus if absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    /// Samples averaged per reading (single shot if absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oversample: Option<u32>,
    // Last so it serializes as a trailing table.
    pub location: Location,
}

impl SensorConfig {
    pub fn new(kind: SensorKind, location: Location) -> Self {
        Self {
            kind,
            bus: None,
            address: None,
            device: None,
            interval_secs: default_interval_secs(),
            oversample: None,
            location,
        }
    }

    pub fn bus_path(&self) -> &str {
        match (&self.bus, self.kind.is_one_wire()) {
            (Some(bus), _) => bus,
            (None, true) => DEFAULT_W1_ROOT,
            (None, false) => DEFAULT_I2C_BUS,
        }
    }

    /// Slave address, or the device's default one.
    pub fn i2c_address(&self) -> u16 {
        self.address.unwrap_or(match self.kind {
            SensorKind::Mcp9600 => mcp9600::DEFAULT_ADDRESS,
            _ => bme280::Address::default().value(),
        })
    }

    /// Interval and oversampling as the polling engine takes them.
    pub fn polling(&self) -> Result<PollingConfig, ConfigError> {
        let interval = Duration::try_from_secs_f64(self.interval_secs)
            .map_err(|_| ConfigError::InvalidInterval)?;
        let oversample = match self.oversample {
            Some(n) => Oversample::iterations(n)?,
            None => Oversample::SingleShot,
        };
        Ok(PollingConfig::new(interval, oversample))
    }

    /// Everything the driver would reject at construction, without a bus.
    pub fn check(&self) -> Result<PollingConfig, ConfigError> {
        let polling = self.polling()?;
        polling.validate(self.kind.conversion_time())?;
        if self.kind == SensorKind::Bme280 {
            bme280::Address::try_from(self.i2c_address())?;
        }
        Ok(polling)
    }

    /// Short label for log lines, e.g. `bme280@/dev/i2c-1 (indoor)`.
    pub fn label(&self) -> String {
        format!("{}@{} ({})", self.kind.as_str(), self.bus_path(), self.location)
    }
}

// === File ===

/// Sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "sensor", default)]
    pub sensors: Vec<SensorConfig>,
}

impl Default for Config {
    /// Outdoor DS18B20 averaging 16 samples, indoor BME280, both every minute.
    fn default() -> Self {
        let mut outdoor = SensorConfig::new(SensorKind::Ds18b20, Location::outdoor());
        outdoor.oversample = Some(16);
        Self {
            sensors: vec![
                outdoor,
                SensorConfig::new(SensorKind::Bme280, Location::indoor()),
            ],
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("scales-sensors").join("sensors.toml"))
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load config from `path`, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to load config file: {:#}", e);
                Self::default()
            }
        }
    }

    /// Strict load: a missing or malformed file is an error.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save config to the default path
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
