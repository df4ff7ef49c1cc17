//! Device decoders - one module per supported sensor
//!
//! Every driver validates its [`PollingConfig`](crate::poller::PollingConfig)
//! at construction and implements [`Sensor`](crate::poller::Sensor).

pub mod bme280;
pub mod ds18b20;
pub mod mcp9600;

pub use bme280::Bme280;
pub use ds18b20::Ds18b20;
pub use mcp9600::Mcp9600;
