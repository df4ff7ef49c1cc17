//! Reading model - the value type every sensor produces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// === Quantities ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureUnit {
    Hectopascal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumidityUnit {
    RelativePercent,
}

/// What was measured, together with the unit of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "unit", rename_all = "snake_case")]
pub enum Quantity {
    Temperature(TemperatureUnit),
    BarometricPressure(PressureUnit),
    Humidity(HumidityUnit),
}

impl Quantity {
    pub const CELSIUS: Quantity = Quantity::Temperature(TemperatureUnit::Celsius);
    pub const HECTOPASCAL: Quantity = Quantity::BarometricPressure(PressureUnit::Hectopascal);
    pub const RELATIVE_HUMIDITY: Quantity = Quantity::Humidity(HumidityUnit::RelativePercent);

    pub fn symbol(&self) -> &'static str {
        match self {
            Quantity::Temperature(TemperatureUnit::Celsius) => "°C",
            Quantity::BarometricPressure(PressureUnit::Hectopascal) => "hPa",
            Quantity::Humidity(HumidityUnit::RelativePercent) => "%RH",
        }
    }
}

// === Location ===

/// Where a sensor is mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum Location {
    Indoor {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        area: Option<String>,
    },
    Outdoor {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        area: Option<String>,
    },
}

impl Location {
    pub fn indoor() -> Self {
        Location::Indoor { area: None }
    }

    pub fn outdoor() -> Self {
        Location::Outdoor { area: None }
    }

    pub fn area(&self) -> Option<&str> {
        match self {
            Location::Indoor { area } | Location::Outdoor { area } => area.as_deref(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let placement = match self {
            Location::Indoor { .. } => "indoor",
            Location::Outdoor { .. } => "outdoor",
        };
        match self.area() {
            Some(area) => write!(f, "{}/{}", placement, area),
            None => f.write_str(placement),
        }
    }
}

// === Values ===

/// One decoded physical value, before it is attributed to a sensor.
///
/// Device decoders return these; the polling engine averages them and turns
/// them into [`Reading`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub quantity: Quantity,
    pub value: f64,
}

impl Measurement {
    pub fn new(quantity: Quantity, value: f64) -> Self {
        Self { quantity, value }
    }

    pub fn celsius(value: f64) -> Self {
        Self::new(Quantity::CELSIUS, value)
    }

    pub fn hectopascal(value: f64) -> Self {
        Self::new(Quantity::HECTOPASCAL, value)
    }

    pub fn relative_humidity(value: f64) -> Self {
        Self::new(Quantity::RELATIVE_HUMIDITY, value)
    }
}

/// A calibrated reading published on a sensor's stream.
///
/// Immutable once created; the stream consumer owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    quantity: Quantity,
    location: Location,
    source_id: String,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(
        measurement: Measurement,
        location: Location,
        source_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            quantity: measurement.quantity,
            location,
            source_id: source_id.into(),
            value: measurement.value,
            timestamp,
        }
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} {} ({}, {})",
            self.value,
            self.quantity.symbol(),
            self.location,
            self.source_id
        )
    }
}
