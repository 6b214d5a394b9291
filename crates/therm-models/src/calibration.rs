// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-point reconstruction of sensor codes from oscillator counts.
//!
//! Voltage and temperature are quadratics in `(f0, f1)`:
//!
//! ```text
//! P(w) = w0·1024 + w1·f0 + w2·f1 + w3·f0² + w4·f0·f1 + w5·f1²
//! ```
//!
//! Current is a ten-term quadratic in `(f0, f1, f2)` scaled by the sensor's
//! power-switch code and `f3 = f2 - f1`. Every polynomial is evaluated in
//! `i128`; the current product alone can exceed 2⁷⁰ for legal inputs, and
//! saturates if arbitrary coefficients push it past `i128`.
//!
//! Codes are taken from fixed bit windows of the wide results. A negative
//! polynomial means the calibration is outside its envelope; it floors to 0.

use crate::error::{ModelError, Result};
use therm_chip::factory;
use therm_chip::record::{CURRENT_MASK, POWER_MASK, THERMAL_MASK, VOLTAGE_MASK};
use therm_chip::{FrequencyTriple, SensorRecord};
use tracing::{trace, warn};

/// Voltage code window: `(V >> 25) & 0x3FF`.
pub const VOLTAGE_WINDOW_SHIFT: u32 = 25;
/// Thermal code window: `(T >> 26) & 0x3FF`.
pub const THERMAL_WINDOW_SHIFT: u32 = 26;
/// Current code window: `(I·ps·f3 >> 27) & 0xFFFF`.
pub const CURRENT_WINDOW_SHIFT: u32 = 27;

/// Coefficients for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationWeights {
    /// Voltage quadratic.
    pub voltage: [i64; 6],
    /// Temperature quadratic.
    pub thermal: [i64; 6],
    /// Current quadratic.
    pub current: [i64; 10],
}

impl Default for CalibrationWeights {
    fn default() -> Self {
        Self::factory()
    }
}

impl CalibrationWeights {
    /// Coefficients the chip ships with.
    #[must_use]
    pub const fn factory() -> Self {
        Self {
            voltage: factory::VOLTAGE,
            thermal: factory::THERMAL,
            current: factory::CURRENT,
        }
    }

    /// Decode the 22-word weight buffer (current, voltage, thermal).
    ///
    /// # Errors
    ///
    /// Returns an error if `words` is not exactly 22 entries long.
    pub fn from_buffer_words(words: &[i64]) -> Result<Self> {
        if words.len() != therm_chip::map::SENSOR_WEIGHT_WORDS {
            return Err(ModelError::invalid_calibration(format!(
                "weight buffer holds {} words, expected {}",
                words.len(),
                therm_chip::map::SENSOR_WEIGHT_WORDS
            )));
        }
        let mut w = Self::factory();
        w.current
            .copy_from_slice(&words[factory::CURRENT_OFFSET..factory::VOLTAGE_OFFSET]);
        w.voltage
            .copy_from_slice(&words[factory::VOLTAGE_OFFSET..factory::THERMAL_OFFSET]);
        w.thermal.copy_from_slice(&words[factory::THERMAL_OFFSET..]);
        Ok(w)
    }

    /// Encode in weight-buffer order.
    #[must_use]
    pub fn to_buffer_words(&self) -> [i64; 22] {
        let mut words = [0i64; 22];
        words[factory::CURRENT_OFFSET..factory::VOLTAGE_OFFSET].copy_from_slice(&self.current);
        words[factory::VOLTAGE_OFFSET..factory::THERMAL_OFFSET].copy_from_slice(&self.voltage);
        words[factory::THERMAL_OFFSET..].copy_from_slice(&self.thermal);
        words
    }
}

/// Per-sensor calibration, read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTable {
    sensors: Vec<CalibrationWeights>,
}

impl CalibrationTable {
    /// Same coefficients for every sensor.
    #[must_use]
    pub fn uniform(weights: CalibrationWeights, num_sensors: usize) -> Self {
        Self {
            sensors: vec![weights; num_sensors],
        }
    }

    /// Explicit per-sensor coefficients.
    ///
    /// # Errors
    ///
    /// Returns an error if `sensors` is empty.
    pub fn per_sensor(sensors: Vec<CalibrationWeights>) -> Result<Self> {
        if sensors.is_empty() {
            return Err(ModelError::invalid_calibration("no sensors"));
        }
        Ok(Self { sensors })
    }

    /// Number of sensors covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// `true` when no sensors are covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Coefficients for one sensor.
    #[must_use]
    pub fn sensor(&self, index: usize) -> Option<&CalibrationWeights> {
        self.sensors.get(index)
    }

    /// Reconstruct one sensor's record.
    ///
    /// # Panics
    ///
    /// Panics if `sensor` is outside the table.
    #[must_use]
    pub fn reconstruct(&self, sensor: usize, triple: FrequencyTriple, ps_code: u32) -> SensorRecord {
        reconstruct(triple, &self.sensors[sensor], ps_code)
    }
}

fn quadratic(w: &[i64; 6], a: i128, b: i128) -> i128 {
    i128::from(w[0]) * 1024
        + i128::from(w[1]) * a
        + i128::from(w[2]) * b
        + i128::from(w[3]) * a * a
        + i128::from(w[4]) * a * b
        + i128::from(w[5]) * b * b
}

fn current_polynomial(w: &[i64; 10], f0: i128, f1: i128, f2: i128) -> i128 {
    i128::from(w[0]) * 1024
        + i128::from(w[1]) * f0
        + i128::from(w[2]) * f1
        + i128::from(w[3]) * f2
        + i128::from(w[4]) * f0 * f0
        + i128::from(w[5]) * f1 * f1
        + i128::from(w[6]) * f2 * f2
        + i128::from(w[7]) * f0 * f1
        + i128::from(w[8]) * f0 * f2
        + i128::from(w[9]) * f1 * f2
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn window(value: i128, shift: u32, mask: u64, quantity: &str) -> u64 {
    if value < 0 {
        warn!(quantity, %value, "negative calibration polynomial, code floored to 0");
        return 0;
    }
    ((value >> shift) as u64) & mask
}

/// Reconstruct one `SensorRecord` from raw counts.
///
/// Never fails: out-of-envelope polynomials floor to 0 and every code is
/// truncated to its field width. A triple with `f2 < f1` is treated as
/// `f3 = 0`.
#[must_use]
pub fn reconstruct(triple: FrequencyTriple, weights: &CalibrationWeights, ps_code: u32) -> SensorRecord {
    let f0 = i128::from(triple.f0);
    let f1 = i128::from(triple.f1);
    let f2 = i128::from(triple.f2);
    let f3 = triple.f3().unwrap_or_else(|| {
        warn!(f1 = triple.f1, f2 = triple.f2, "frequency ordering violated, f3 forced to 0");
        0
    });

    let v = quadratic(&weights.voltage, f0, f1);
    let t = quadratic(&weights.thermal, f0, f1);
    let i = current_polynomial(&weights.current, f0, f1, f2)
        .saturating_mul(i128::from(ps_code))
        .saturating_mul(i128::from(f3));

    let voltage = window(v, VOLTAGE_WINDOW_SHIFT, VOLTAGE_MASK, "voltage");
    let thermal = window(t, THERMAL_WINDOW_SHIFT, THERMAL_MASK, "thermal");
    let current = window(i, CURRENT_WINDOW_SHIFT, CURRENT_MASK, "current");
    let power = (voltage * current) & POWER_MASK;

    trace!(?triple, ps_code, thermal, voltage, current, power, "reconstructed");
    SensorRecord::new(thermal, voltage, current, power)
}
