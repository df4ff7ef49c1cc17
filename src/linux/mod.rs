//! Linux bus drivers - `/dev/i2c-N` character devices and the `w1` sysfs tree
//!
//! Only compiled on Linux with the "linux" feature enabled.

pub mod i2c;
pub mod w1;

pub use i2c::LinuxI2c;
pub use w1::SysfsOneWire;
