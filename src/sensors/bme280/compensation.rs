//! Raw frame reassembly and the vendor fixed-point compensation formulas
//!
//! Temperature must be compensated first: it yields the [`FineTemperature`]
//! term that pressure and humidity compensation take as an argument. The
//! token can only be obtained from [`compensate_temperature`], so the
//! ordering is enforced by the function signatures.
//!
//! Arithmetic wraps like the vendor's two's-complement C code; for any real
//! calibration the results are identical and garbage input cannot panic.

use super::calibration::{
    Calibration, HumidityCalibration, PressureCalibration, TemperatureCalibration,
};

/// First register of the burst-readable data block (`press_msb`).
pub const DATA_START: u8 = 0xF7;
/// `press_msb` ..= `hum_lsb`.
pub const DATA_LEN: usize = 8;

/// Humidity output saturates at 100 %RH in Q22.10 (before the final shift).
const HUMIDITY_MAX: i32 = 419_430_400;

/// Uncompensated ADC codes from one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    /// 20-bit pressure code.
    pub pressure: u32,
    /// 20-bit temperature code.
    pub temperature: u32,
    /// 16-bit humidity code.
    pub humidity: u16,
}

impl RawFrame {
    /// Split the 0xF7..=0xFE burst into its three codes.
    pub fn from_registers(data: &[u8; DATA_LEN]) -> Self {
        Self {
            pressure: reassemble_20bit(data[0], data[1], data[2]),
            temperature: reassemble_20bit(data[3], data[4], data[5]),
            humidity: u16::from_be_bytes([data[6], data[7]]),
        }
    }
}

/// Rebuild a 20-bit ADC code from its MSB, LSB and XLSB registers.
///
/// Only the top nibble of `xlsb` carries data.
pub fn reassemble_20bit(msb: u8, lsb: u8, xlsb: u8) -> u32 {
    (u32::from(msb) << 12) | (u32::from(lsb) << 4) | (u32::from(xlsb) >> 4)
}

/// Vendor `t_fine`: fine temperature carried from the temperature step into
/// the pressure and humidity steps of the same conversion.
#[derive(Debug, PartialEq, Eq)]
pub struct FineTemperature(i32);

impl FineTemperature {
    pub fn value(&self) -> i32 {
        self.0
    }
}

/// Output of the temperature step.
#[derive(Debug, PartialEq)]
pub struct CompensatedTemperature {
    pub celsius: f64,
    pub fine: FineTemperature,
}

/// Calibrated values of one conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compensated {
    pub temperature_celsius: f64,
    pub pressure_hpa: f64,
    pub humidity_percent: f64,
}

impl Calibration {
    /// Temperature, then pressure and humidity from the same fine term.
    pub fn compensate(&self, frame: &RawFrame) -> Compensated {
        let temperature = compensate_temperature(&self.temperature, frame.temperature);
        let pressure_pa = compensate_pressure(&self.pressure, &temperature.fine, frame.pressure);
        let humidity = compensate_humidity(&self.humidity, &temperature.fine, frame.humidity);
        Compensated {
            temperature_celsius: temperature.celsius,
            pressure_hpa: pressure_pa / 100.0,
            humidity_percent: humidity,
        }
    }
}

/// 32-bit integer temperature formula. Resolution 0.01 °C.
pub fn compensate_temperature(cal: &TemperatureCalibration, adc_t: u32) -> CompensatedTemperature {
    let adc_t = adc_t as i32;
    let t1 = i32::from(cal.t1);
    let t2 = i32::from(cal.t2);
    let t3 = i32::from(cal.t3);

    let var1 = ((adc_t >> 3).wrapping_sub(t1 << 1)).wrapping_mul(t2) >> 11;
    let delta = (adc_t >> 4).wrapping_sub(t1);
    let var2 = ((delta.wrapping_mul(delta) >> 12).wrapping_mul(t3)) >> 14;

    let t_fine = var1.wrapping_add(var2);
    let centi_celsius = t_fine.wrapping_mul(5).wrapping_add(128) >> 8;

    CompensatedTemperature {
        celsius: f64::from(centi_celsius) / 100.0,
        fine: FineTemperature(t_fine),
    }
}

/// 64-bit integer pressure formula, returned in pascal.
///
/// Returns 0 when the calibration makes the divisor vanish.
pub fn compensate_pressure(cal: &PressureCalibration, fine: &FineTemperature, adc_p: u32) -> f64 {
    let q24_8 = pressure_q24_8(cal, fine, adc_p);
    f64::from(q24_8) / 256.0
}

fn pressure_q24_8(cal: &PressureCalibration, fine: &FineTemperature, adc_p: u32) -> u32 {
    let p1 = i64::from(cal.p1);
    let p2 = i64::from(cal.p2);
    let p3 = i64::from(cal.p3);
    let p4 = i64::from(cal.p4);
    let p5 = i64::from(cal.p5);
    let p6 = i64::from(cal.p6);
    let p7 = i64::from(cal.p7);
    let p8 = i64::from(cal.p8);
    let p9 = i64::from(cal.p9);

    let mut var1 = i64::from(fine.0) - 128_000;
    let mut var2 = var1.wrapping_mul(var1).wrapping_mul(p6);
    var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 17);
    var2 = var2.wrapping_add(p4 << 35);
    var1 = (var1.wrapping_mul(var1).wrapping_mul(p3) >> 8).wrapping_add(var1.wrapping_mul(p2) << 12);
    var1 = ((1i64 << 47).wrapping_add(var1)).wrapping_mul(p1) >> 33;

    if var1 == 0 {
        return 0;
    }

    let mut p = 1_048_576 - i64::from(adc_p);
    p = ((p << 31).wrapping_sub(var2)).wrapping_mul(3125).wrapping_div(var1);
    let var1 = p9.wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
    let var2 = p8.wrapping_mul(p) >> 19;
    p = (p.wrapping_add(var1).wrapping_add(var2) >> 8).wrapping_add(p7 << 4);

    p as u32
}

/// 32-bit integer humidity formula, returned in %RH (clamped to 0..=100).
pub fn compensate_humidity(cal: &HumidityCalibration, fine: &FineTemperature, adc_h: u16) -> f64 {
    let adc_h = i32::from(adc_h);
    let h1 = i32::from(cal.h1);
    let h2 = i32::from(cal.h2);
    let h3 = i32::from(cal.h3);
    let h4 = i32::from(cal.h4);
    let h5 = i32::from(cal.h5);
    let h6 = i32::from(cal.h6);

    let x = fine.0.wrapping_sub(76_800);

    let scaled = ((adc_h << 14)
        .wrapping_sub(h4 << 20)
        .wrapping_sub(h5.wrapping_mul(x))
        .wrapping_add(16_384))
        >> 15;
    let h6_term = x.wrapping_mul(h6) >> 10;
    let h3_term = (x.wrapping_mul(h3) >> 11).wrapping_add(32_768);
    let sensitivity = ((h6_term.wrapping_mul(h3_term) >> 10).wrapping_add(2_097_152))
        .wrapping_mul(h2)
        .wrapping_add(8_192)
        >> 14;

    let mut v = scaled.wrapping_mul(sensitivity);
    let square = (v >> 15).wrapping_mul(v >> 15) >> 7;
    v = v.wrapping_sub(square.wrapping_mul(h1) >> 4);
    v = v.clamp(0, HUMIDITY_MAX);

    f64::from((v >> 12) as u32) / 1024.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Worked-example calibration from the vendor datasheet, with typical
    /// humidity constants.
    pub(crate) fn datasheet_calibration() -> Calibration {
        Calibration {
            temperature: TemperatureCalibration {
                t1: 27504,
                t2: 26435,
                t3: -1000,
            },
            pressure: PressureCalibration {
                p1: 36477,
                p2: -10685,
                p3: 3024,
                p4: 2855,
                p5: 140,
                p6: -7,
                p7: 15500,
                p8: -14600,
                p9: 6000,
            },
            humidity: HumidityCalibration {
                h1: 75,
                h2: 370,
                h3: 0,
                h4: 313,
                h5: 50,
                h6: 30,
            },
        }
    }

    const ADC_T: u32 = 519_888;

    #[test]
    fn test_reassemble_20bit_matches_formula_and_range() {
        for msb in 0..=255u8 {
            for lsb in [0x00u8, 0x01, 0x2C, 0x80, 0xFF] {
                for xlsb in 0..=255u8 {
                    let value = reassemble_20bit(msb, lsb, xlsb);
                    let expected =
                        ((msb as u32) << 12) | ((lsb as u32) << 4) | ((xlsb as u32) >> 4);
                    assert_eq!(value, expected);
                    assert!(value < 1 << 20);
                }
            }
        }
        assert_eq!(reassemble_20bit(0xFF, 0xFF, 0xFF), 0xF_FFFF);
        assert_eq!(reassemble_20bit(0x5E, 0x2C, 0x00), 0x5E2C0);
        // Low nibble of XLSB is padding.
        assert_eq!(reassemble_20bit(0x5E, 0x2C, 0x0F), 0x5E2C0);
    }

    #[test]
    fn test_frame_from_registers() {
        let frame = RawFrame::from_registers(&[0x5E, 0x2C, 0x00, 0x7E, 0xED, 0x00, 0x6D, 0x2E]);
        assert_eq!(
            frame,
            RawFrame {
                pressure: 0x5E2C0,
                temperature: ADC_T,
                humidity: 0x6D2E,
            }
        );
    }

    #[test]
    fn test_temperature_golden_value() {
        let cal = datasheet_calibration();
        let temperature = compensate_temperature(&cal.temperature, ADC_T);
        assert_eq!(temperature.fine.value(), 128_422);
        assert_eq!(temperature.celsius, 25.08);
    }

    #[test]
    fn test_pressure_golden_values() {
        let cal = datasheet_calibration();
        let fine = compensate_temperature(&cal.temperature, ADC_T).fine;

        // Datasheet worked example.
        assert_eq!(pressure_q24_8(&cal.pressure, &fine, 415_148), 25_767_233);
        let pa = compensate_pressure(&cal.pressure, &fine, 415_148);
        assert!((pa - 100_653.253_906_25).abs() < 1e-9);

        // Bytes (0x5E, 0x2C, 0x00).
        let adc_p = reassemble_20bit(0x5E, 0x2C, 0x00);
        assert_eq!(pressure_q24_8(&cal.pressure, &fine, adc_p), 27_068_453);
        let hpa = compensate_pressure(&cal.pressure, &fine, adc_p) / 100.0;
        assert!((hpa - 1057.361_445_312_5).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_pressure_divisor_yields_zero() {
        let mut cal = datasheet_calibration();
        cal.pressure.p1 = 0;
        let fine = compensate_temperature(&cal.temperature, ADC_T).fine;
        assert_eq!(compensate_pressure(&cal.pressure, &fine, 415_148), 0.0);
    }

    #[test]
    fn test_humidity_golden_value_and_clamping() {
        let cal = datasheet_calibration();
        let fine = compensate_temperature(&cal.temperature, ADC_T).fine;

        let rh = compensate_humidity(&cal.humidity, &fine, 0x6D2E);
        assert_eq!(rh, 45_603.0 / 1024.0);

        assert_eq!(compensate_humidity(&cal.humidity, &fine, 0), 0.0);
        assert_eq!(compensate_humidity(&cal.humidity, &fine, 0xFFFF), 100.0);
    }

    #[test]
    fn test_compensation_is_deterministic() {
        let cal = datasheet_calibration();
        let frame = RawFrame {
            pressure: 415_148,
            temperature: ADC_T,
            humidity: 0x6D2E,
        };
        let first = cal.compensate(&frame);
        let second = cal.compensate(&frame);
        assert_eq!(first, second);
        assert_eq!(first.temperature_celsius, 25.08);
        assert!((first.pressure_hpa - 1006.532_539_062_5).abs() < 1e-9);
        assert_eq!(first.humidity_percent, 45_603.0 / 1024.0);
    }

    #[test]
    fn test_saturated_registers_do_not_panic() {
        let cal = datasheet_calibration();
        let frame = RawFrame::from_registers(&[0xFF; DATA_LEN]);
        let compensated = cal.compensate(&frame);
        assert!(compensated.humidity_percent >= 0.0 && compensated.humidity_percent <= 100.0);
    }
}
