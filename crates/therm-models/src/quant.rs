// SPDX-License-Identifier: AGPL-3.0-only

//! Quantization codec between raw sensor codes and the network's `i8` input.
//!
//! Each signal has an affine map expressed with shifts only:
//!
//! ```text
//! quantize:   q = clamp_target(shift(clamp(raw, min, max) - min) + offset)
//! dequantize: raw = clamp(unshift(q - offset) + min, 0, 1023)
//! ```
//!
//! `shift` is a left shift for upscaling channels and a right shift
//! otherwise; `unshift` is its reverse. Only the thermal branch is ever
//! dequantized.

use crate::error::{ModelError, Result};
use therm_chip::record::THERMAL_MAX;
use therm_chip::regfile::{DequantRegfileEntry, QuantRegfileEntry};

/// Largest shift a channel may use.
pub const MAX_SHIFT: u8 = 31;

/// Affine shift/offset map for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelScaling {
    /// Smallest raw value accepted; lower values clamp here.
    pub data_min: u32,
    /// Largest raw value accepted; higher values clamp here.
    pub data_max: u32,
    /// Shift amount.
    pub shift: u8,
    /// Left shift when set, right shift otherwise.
    pub upscale: bool,
    /// Signed offset added after shifting.
    pub offset: i32,
}

impl ChannelScaling {
    /// Clamp a raw value to `[data_min, data_max]`.
    #[must_use]
    ///
    /// Swapped bounds are taken in order rather than trusted.
    pub fn clamp(&self, raw: u32) -> u32 {
        let (lo, hi) = self.bounds();
        raw.clamp(lo, hi)
    }

    /// Scaled value before the target clamp.
    ///
    /// Total over every field setting: shifts cap at 31 and sums saturate.
    #[must_use]
    pub fn scale(&self, raw: u32) -> i64 {
        let (lo, _) = self.bounds();
        let zero_based = i64::from(self.clamp(raw) - lo);
        let scaled = if self.upscale {
            zero_based << self.shift_bits()
        } else {
            zero_based >> self.shift_bits()
        };
        scaled.saturating_add(i64::from(self.offset))
    }

    /// Reverse of [`ChannelScaling::scale`], before the output clamp.
    #[must_use]
    pub fn unscale(&self, q: i32) -> i64 {
        let (lo, _) = self.bounds();
        let scaled = i64::from(q) - i64::from(self.offset);
        let zero_based = if self.upscale {
            scaled >> self.shift_bits()
        } else {
            scaled << self.shift_bits()
        };
        zero_based.saturating_add(i64::from(lo))
    }

    fn bounds(&self) -> (u32, u32) {
        (self.data_min.min(self.data_max), self.data_min.max(self.data_max))
    }

    fn shift_bits(&self) -> u32 {
        u32::from(self.shift.min(MAX_SHIFT))
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.data_min > self.data_max {
            return Err(ModelError::invalid_scaling(format!(
                "{name}: data_min {} exceeds data_max {}",
                self.data_min, self.data_max
            )));
        }
        if self.shift > MAX_SHIFT {
            return Err(ModelError::invalid_scaling(format!(
                "{name}: shift {} exceeds {MAX_SHIFT}",
                self.shift
            )));
        }
        Ok(())
    }
}

/// Global codec parameters, immutable after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingParams {
    /// Power branch.
    pub power: ChannelScaling,
    /// Thermal branch (also used for dequantization).
    pub thermal: ChannelScaling,
    /// Lowest network input value.
    pub target_min: i8,
    /// Highest network input value.
    pub target_max: i8,
}

impl Default for ScalingParams {
    /// Power `[0, 2²⁶-1] >> 18`, thermal `[0, 1023] >> 2`, both offset by
    /// -128 into `[-128, 127]`.
    fn default() -> Self {
        Self {
            power: ChannelScaling {
                data_min: 0,
                data_max: (1 << 26) - 1,
                shift: 18,
                upscale: false,
                offset: -128,
            },
            thermal: ChannelScaling {
                data_min: 0,
                data_max: u32::from(THERMAL_MAX),
                shift: 2,
                upscale: false,
                offset: -128,
            },
            target_min: -128,
            target_max: 127,
        }
    }
}

impl ScalingParams {
    /// Check ranges and shifts.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel's range is inverted, a shift exceeds 31,
    /// or the target range is empty.
    pub fn validate(&self) -> Result<()> {
        self.power.validate("power")?;
        self.thermal.validate("thermal")?;
        if self.target_min > self.target_max {
            return Err(ModelError::invalid_scaling(format!(
                "target range [{}, {}] is empty",
                self.target_min, self.target_max
            )));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_target(&self, v: i64) -> i8 {
        let lo = self.target_min.min(self.target_max);
        let hi = self.target_min.max(self.target_max);
        v.clamp(i64::from(lo), i64::from(hi)) as i8
    }

    /// Quantize one power code.
    #[must_use]
    pub fn quantize_power(&self, raw: u32) -> i8 {
        self.to_target(self.power.scale(raw))
    }

    /// Quantize one thermal code.
    #[must_use]
    pub fn quantize_thermal(&self, raw: u16) -> i8 {
        self.to_target(self.thermal.scale(u32::from(raw)))
    }

    /// Build the network input: all power channels, then all thermal
    /// channels, each in sensor order.
    ///
    /// # Panics
    ///
    /// Panics if `power` and `thermal` differ in length or `out` is not
    /// twice their length.
    pub fn quantize(&self, power: &[u32], thermal: &[u16], out: &mut [i8]) {
        let n = power.len();
        assert_eq!(thermal.len(), n, "power and thermal sensor counts differ");
        assert_eq!(out.len(), 2 * n, "quantized input must hold 2 values per sensor");
        let (p_out, t_out) = out.split_at_mut(n);
        for (o, &p) in p_out.iter_mut().zip(power) {
            *o = self.quantize_power(p);
        }
        for (o, &t) in t_out.iter_mut().zip(thermal) {
            *o = self.quantize_thermal(t);
        }
    }

    /// Map one network output back to a thermal code in `[0, 1023]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn dequantize(&self, q: i32) -> u16 {
        self.thermal.unscale(q).clamp(0, i64::from(THERMAL_MAX)) as u16
    }

    /// Dequantize a whole output vector.
    ///
    /// # Panics
    ///
    /// Panics if `raw` and `out` differ in length.
    pub fn dequantize_all(&self, raw: &[i32], out: &mut [u16]) {
        assert_eq!(raw.len(), out.len(), "output length mismatch");
        for (o, &q) in out.iter_mut().zip(raw) {
            *o = self.dequantize(q);
        }
    }

    /// Hardware standardization-unit words equivalent to this codec.
    ///
    /// The unit takes a unit multiplier with the same shift and zero point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn regfile_entries(&self) -> (QuantRegfileEntry, DequantRegfileEntry) {
        let zp = |offset: i32| offset.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8;
        let quant = QuantRegfileEntry {
            thermal_mult: 1,
            thermal_shift: self.thermal.shift,
            thermal_zero_point: zp(self.thermal.offset),
            power_mult: 1,
            power_shift: self.power.shift,
            power_zero_point: zp(self.power.offset),
        };
        let dequant = DequantRegfileEntry {
            scale: 1,
            shift: self.thermal.shift,
            zero_point: zp(self.thermal.offset),
        };
        (quant, dequant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scaling_is_valid() {
        ScalingParams::default().validate().unwrap();
    }

    #[test]
    fn thermal_round_trip_within_one_step() {
        let s = ScalingParams::default();
        let step = 1i32 << s.thermal.shift;
        for raw in 0..=THERMAL_MAX {
            let back = s.dequantize(i32::from(s.quantize_thermal(raw)));
            let err = i32::from(raw) - i32::from(back);
            assert!(
                (0..step).contains(&err),
                "raw {raw} came back as {back} (err {err})"
            );
        }
    }

    #[test]
    fn power_clamps_to_data_range() {
        let s = ScalingParams {
            power: ChannelScaling {
                data_min: 1000,
                data_max: 5000,
                shift: 5,
                upscale: false,
                offset: -100,
            },
            ..ScalingParams::default()
        };
        assert_eq!(s.power.clamp(9000), 5000);
        assert_eq!(s.power.clamp(10), 1000);
        assert_eq!(s.quantize_power(u32::MAX), s.quantize_power(5000));
        assert_eq!(s.quantize_power(0), s.quantize_power(1000));
        assert_eq!(s.quantize_power(5000), 25); // (4000 >> 5) - 100
        assert_eq!(s.quantize_power(1000), -100);
    }

    #[test]
    fn input_is_power_then_thermal() {
        let s = ScalingParams::default();
        let mut out = [0i8; 4];
        s.quantize(&[0, (1 << 26) - 1], &[516, 1023], &mut out);
        assert_eq!(out, [-128, 127, 1, 127]);
    }

    #[test]
    fn upscale_shifts_left() {
        let s = ScalingParams {
            thermal: ChannelScaling {
                data_min: 100,
                data_max: 160,
                shift: 1,
                upscale: true,
                offset: -60,
            },
            ..ScalingParams::default()
        };
        assert_eq!(s.quantize_thermal(130), 0);
        assert_eq!(s.quantize_thermal(160), 60);
        assert_eq!(s.dequantize(60), 160);
        // Right shift on the way back floors.
        assert_eq!(s.dequantize(1), 130);
    }

    #[test]
    fn dequantize_clamps_to_ten_bits() {
        let s = ScalingParams::default();
        assert_eq!(s.dequantize(i32::MAX), 1023);
        assert_eq!(s.dequantize(i32::MIN), 0);
        assert_eq!(s.dequantize(-129), 0);
        assert_eq!(s.dequantize(-67), 244);
    }

    #[test]
    fn inverted_range_rejected() {
        let mut s = ScalingParams::default();
        s.thermal.data_min = 2000;
        assert!(s.validate().is_err());
        let mut s = ScalingParams::default();
        s.target_min = 10;
        s.target_max = -10;
        assert!(s.validate().is_err());
        let mut s = ScalingParams::default();
        s.power.shift = 40;
        assert!(s.validate().is_err());
    }

    #[test]
    fn unvalidated_settings_never_trap() {
        let s = ScalingParams {
            power: ChannelScaling {
                data_min: 5000,
                data_max: 1000,
                shift: 200,
                upscale: true,
                offset: i32::MAX,
            },
            thermal: ChannelScaling {
                data_min: 1023,
                data_max: 0,
                ..ScalingParams::default().thermal
            },
            target_min: 10,
            target_max: -10,
        };
        assert!(s.validate().is_err());

        assert_eq!(s.power.clamp(9000), 5000);
        assert_eq!(s.power.clamp(10), 1000);
        for raw in [0, 1000, 3000, 5000, u32::MAX] {
            assert!((-10..=10).contains(&s.quantize_power(raw)), "raw {raw}");
        }
        let mut out = [0i8; 4];
        s.quantize(&[0, u32::MAX], &[0, 1023], &mut out);
        assert!(out.iter().all(|q| (-10..=10).contains(q)), "{out:?}");
        for q in [i32::MIN, -1, 0, i32::MAX] {
            assert!(s.dequantize(q) <= THERMAL_MAX);
        }
    }

    #[test]
    fn regfile_entries_follow_codec() {
        let (q, d) = ScalingParams::default().regfile_entries();
        assert_eq!(q.power_shift, 18);
        assert_eq!(q.thermal_shift, 2);
        assert_eq!(q.thermal_zero_point, -128);
        assert_eq!(d.shift, 2);
    }
}
