// SPDX-License-Identifier: AGPL-3.0-only

//! Packed sensor words.
//!
//! ```text
//! SensorRecord (u64)
//!   [9:0]    thermal code   10 bits
//!   [19:10]  voltage code   10 bits
//!   [35:20]  current code   16 bits
//!   [61:36]  power code     26 bits
//!   [63:62]  zero
//!
//! FrequencyTriple (u32)
//!   [9:0]    f0             10 bits
//!   [20:10]  f1             11 bits
//!   [31:21]  f2             11 bits
//! ```
//!
//! Constructors mask every field to its width, so a record can never spill
//! into a neighbouring field.

// ── Field widths ─────────────────────────────────────────────────────────────

/// Thermal code mask (10 bits).
pub const THERMAL_MASK: u64 = 0x3FF;
/// Voltage code mask (10 bits).
pub const VOLTAGE_MASK: u64 = 0x3FF;
/// Current code mask (16 bits).
pub const CURRENT_MASK: u64 = 0xFFFF;
/// Power code mask (26 bits).
pub const POWER_MASK: u64 = 0x3FF_FFFF;

const VOLTAGE_SHIFT: u32 = 10;
const CURRENT_SHIFT: u32 = 20;
const POWER_SHIFT: u32 = 36;

/// f0 mask (10 bits).
pub const F0_MASK: u32 = 0x3FF;
/// f1 / f2 mask (11 bits).
pub const F12_MASK: u32 = 0x7FF;

const F1_SHIFT: u32 = 10;
const F2_SHIFT: u32 = 21;

/// Largest representable thermal code.
pub const THERMAL_MAX: u16 = 0x3FF;

// ── SensorRecord ─────────────────────────────────────────────────────────────

/// One sensor's reconstructed codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorRecord {
    thermal: u16,
    voltage: u16,
    current: u16,
    power: u32,
}

impl SensorRecord {
    /// Build a record, truncating every field to its bit width.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(thermal: u64, voltage: u64, current: u64, power: u64) -> Self {
        Self {
            thermal: (thermal & THERMAL_MASK) as u16,
            voltage: (voltage & VOLTAGE_MASK) as u16,
            current: (current & CURRENT_MASK) as u16,
            power: (power & POWER_MASK) as u32,
        }
    }

    /// Thermal code.
    #[must_use]
    pub const fn thermal(&self) -> u16 {
        self.thermal
    }

    /// Voltage code.
    #[must_use]
    pub const fn voltage(&self) -> u16 {
        self.voltage
    }

    /// Current code.
    #[must_use]
    pub const fn current(&self) -> u16 {
        self.current
    }

    /// Power code.
    #[must_use]
    pub const fn power(&self) -> u32 {
        self.power
    }

    /// Pack into the sensor-data buffer word.
    #[must_use]
    pub const fn pack(&self) -> u64 {
        (self.thermal as u64)
            | ((self.voltage as u64) << VOLTAGE_SHIFT)
            | ((self.current as u64) << CURRENT_SHIFT)
            | ((self.power as u64) << POWER_SHIFT)
    }

    /// Unpack a sensor-data buffer word. Bits `[63:62]` are ignored.
    #[must_use]
    pub const fn unpack(word: u64) -> Self {
        Self::new(
            word,
            word >> VOLTAGE_SHIFT,
            word >> CURRENT_SHIFT,
            word >> POWER_SHIFT,
        )
    }
}

// ── FrequencyTriple ──────────────────────────────────────────────────────────

/// Raw oscillator counts for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrequencyTriple {
    /// Ring-oscillator count 0 (10 bits).
    pub f0: u16,
    /// Ring-oscillator count 1 (11 bits).
    pub f1: u16,
    /// Ring-oscillator count 2 (11 bits).
    pub f2: u16,
}

impl FrequencyTriple {
    /// Build a triple, truncating each count to its bit width.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(f0: u16, f1: u16, f2: u16) -> Self {
        Self {
            f0: f0 & F0_MASK as u16,
            f1: f1 & F12_MASK as u16,
            f2: f2 & F12_MASK as u16,
        }
    }

    /// Unpack a frequency-buffer word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn unpack(word: u32) -> Self {
        Self {
            f0: (word & F0_MASK) as u16,
            f1: ((word >> F1_SHIFT) & F12_MASK) as u16,
            f2: ((word >> F2_SHIFT) & F12_MASK) as u16,
        }
    }

    /// Pack into a frequency-buffer word.
    #[must_use]
    pub const fn pack(&self) -> u32 {
        (self.f0 as u32 & F0_MASK)
            | ((self.f1 as u32 & F12_MASK) << F1_SHIFT)
            | ((self.f2 as u32 & F12_MASK) << F2_SHIFT)
    }

    /// `f2 - f1`, or `None` when the hardware ordering `f2 >= f1` is broken.
    #[must_use]
    pub const fn f3(&self) -> Option<u16> {
        self.f2.checked_sub(self.f1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_fields_recover_exactly() {
        let cases = [
            (0, 0, 0, 0),
            (1023, 1023, 0xFFFF, 0x3FF_FFFF),
            (516, 467, 8, 3736),
            (0x2AA, 0x155, 0xA5A5, 0x2AA_AAAA),
        ];
        for (t, v, c, p) in cases {
            let r = SensorRecord::unpack(SensorRecord::new(t, v, c, p).pack());
            assert_eq!(u64::from(r.thermal()), t);
            assert_eq!(u64::from(r.voltage()), v);
            assert_eq!(u64::from(r.current()), c);
            assert_eq!(u64::from(r.power()), p);
        }
    }

    #[test]
    fn record_golden_word() {
        let r = SensorRecord::new(516, 467, 8, 3736);
        assert_eq!(r.pack(), 0xE980_0087_4E04);
    }

    #[test]
    fn oversized_fields_are_masked() {
        let r = SensorRecord::new(0x7FF, 0x400, 0x1_0001, 0x400_0002);
        assert_eq!(r.thermal(), 0x3FF);
        assert_eq!(r.voltage(), 0);
        assert_eq!(r.current(), 1);
        assert_eq!(r.power(), 2);
        assert_eq!(r.pack() >> 62, 0, "reserved bits must stay clear");
    }

    #[test]
    fn single_field_does_not_leak() {
        let word = SensorRecord::new(0, 0, 0xFFFF, 0).pack();
        assert_eq!(word, 0xFFFF << 20);
    }

    #[test]
    fn frequency_word_layout() {
        let f = FrequencyTriple::new(10, 20, 21);
        assert_eq!(f.pack(), 10 | (20 << 10) | (21 << 21));
        assert_eq!(FrequencyTriple::unpack(f.pack()), f);

        let max = FrequencyTriple::new(0x3FF, 0x7FF, 0x7FF);
        assert_eq!(max.pack(), u32::MAX);
    }

    #[test]
    fn f3_requires_ordered_counts() {
        assert_eq!(FrequencyTriple::new(10, 20, 21).f3(), Some(1));
        assert_eq!(FrequencyTriple::new(10, 20, 20).f3(), Some(0));
        assert_eq!(FrequencyTriple::new(10, 21, 20).f3(), None);
    }
}
