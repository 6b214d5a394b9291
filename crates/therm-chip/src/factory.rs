// SPDX-License-Identifier: AGPL-3.0-only

//! Factory calibration for the IVT sensors.
//!
//! The weight buffer at [`crate::map::SENSOR_WEIGHT_BUFFER_BASE`] holds 22
//! signed 64-bit words in the order current (10), voltage (6), thermal (6).
//!
//! Voltage and thermal coefficients are released as 32-bit two's-complement
//! bit patterns. They are sign-extended to 64 bits here, so a pattern with
//! bit 31 set is a negative coefficient.

/// Current polynomial coefficients.
pub const CURRENT: [i64; 10] = [
    1_120_538, -3_316_961, 578_850, -472_836, 2391, 246, 81, -951, -196, 809,
];

/// Voltage polynomial coefficients.
pub const VOLTAGE: [i64; 6] = [15_511_046, -14_362_264, -2_096_693, 1170, 10_220, 1209];

/// Thermal polynomial coefficients.
pub const THERMAL: [i64; 6] = [104_439_597, -439_831_618, 38_664_445, 445_476, -73_027, -72];

/// Word offset of the current coefficients in the weight buffer.
pub const CURRENT_OFFSET: usize = 0;
/// Word offset of the voltage coefficients.
pub const VOLTAGE_OFFSET: usize = 10;
/// Word offset of the thermal coefficients.
pub const THERMAL_OFFSET: usize = 16;

/// The 22 weight-buffer words in buffer order.
#[must_use]
pub fn weight_buffer_words() -> [i64; 22] {
    let mut words = [0i64; 22];
    words[CURRENT_OFFSET..VOLTAGE_OFFSET].copy_from_slice(&CURRENT);
    words[VOLTAGE_OFFSET..THERMAL_OFFSET].copy_from_slice(&VOLTAGE);
    words[THERMAL_OFFSET..].copy_from_slice(&THERMAL);
    words
}
