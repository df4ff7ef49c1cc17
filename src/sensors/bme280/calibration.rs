//! Factory calibration constants, read once from non-volatile registers

use crate::bus::I2cBus;
use crate::error::BusError;

// Register addresses of the calibration table. Multi-byte constants are
// little-endian, which is the SMBus word order, so each is one word read.
const DIG_T1: u8 = 0x88;
const DIG_T2: u8 = 0x8A;
const DIG_T3: u8 = 0x8C;
const DIG_P1: u8 = 0x8E;
const DIG_P2_TO_P9: [u8; 8] = [0x90, 0x92, 0x94, 0x96, 0x98, 0x9A, 0x9C, 0x9E];
const DIG_H1: u8 = 0xA1;
const DIG_H2: u8 = 0xE1;
const DIG_H3: u8 = 0xE3;
/// `dig_H4` and `dig_H5` are 12-bit values packed into 0xE4..=0xE6.
const DIG_H4_H5: u8 = 0xE4;
const DIG_H6: u8 = 0xE7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureCalibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureCalibration {
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumidityCalibration {
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

/// Per-device constants. Owned by one sensor; never re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub temperature: TemperatureCalibration,
    pub pressure: PressureCalibration,
    pub humidity: HumidityCalibration,
}

impl Calibration {
    pub fn read<B: I2cBus + ?Sized>(bus: &mut B, address: u16) -> Result<Self, BusError> {
        let mut signed = |register: u8| -> Result<i16, BusError> {
            Ok(bus.read_word(address, register)? as i16)
        };
        let t2 = signed(DIG_T2)?;
        let t3 = signed(DIG_T3)?;
        let mut p = [0i16; 8];
        for (slot, register) in p.iter_mut().zip(DIG_P2_TO_P9) {
            *slot = signed(register)?;
        }
        let h2 = signed(DIG_H2)?;

        let temperature = TemperatureCalibration {
            t1: bus.read_word(address, DIG_T1)?,
            t2,
            t3,
        };
        let pressure = PressureCalibration {
            p1: bus.read_word(address, DIG_P1)?,
            p2: p[0],
            p3: p[1],
            p4: p[2],
            p5: p[3],
            p6: p[4],
            p7: p[5],
            p8: p[6],
            p9: p[7],
        };

        let mut packed = [0u8; 3];
        bus.read_block(address, DIG_H4_H5, &mut packed)?;
        let (h4, h5) = unpack_h4_h5(packed);

        let humidity = HumidityCalibration {
            h1: bus.read_byte(address, DIG_H1)?,
            h2,
            h3: bus.read_byte(address, DIG_H3)?,
            h4,
            h5,
            h6: bus.read_byte(address, DIG_H6)? as i8,
        };

        Ok(Self {
            temperature,
            pressure,
            humidity,
        })
    }
}

/// 0xE4 holds H4[11:4], 0xE5 holds H4[3:0] (low nibble) and H5[3:0] (high
/// nibble), 0xE6 holds H5[11:4]. The MSB registers are signed.
fn unpack_h4_h5([e4, e5, e6]: [u8; 3]) -> (i16, i16) {
    let h4 = (i16::from(e4 as i8) << 4) | i16::from(e5 & 0x0F);
    let h5 = (i16::from(e6 as i8) << 4) | i16::from(e5 >> 4);
    (h4, h5)
}
