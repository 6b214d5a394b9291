// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration register-file words.
//!
//! The thermal top is configured through three register files:
//!
//! * the **top** regfile (4 × u64) selecting what the top does each
//!   iteration and where it stores results,
//! * the **quant** regfile, one word per sensor carrying the hardware
//!   standardization unit's thermal and power scale,
//! * the **dequant** regfile, one word per sensor for the reverse path.
//!
//! Word 0 of the top regfile holds the start bit, so it must be written after
//! words 1 to 3 ([`TopConfig::write_order`]).

// ── Top regfile ──────────────────────────────────────────────────────────────

/// Thermal-top control configuration.
///
/// ```text
/// word 0  [0] start  [1] enable  [2] stop  [3] collect_en  [4] collect_mode
///         [5] pred_en  [6] pred_mode  [7] schedule_en  [9:8] store_sensor_mode
///         [14:10] action_offset  [31:15] num_itr  [63:32] sampling_intvl
/// word 1  [31:0] sensor_data_base  [63:32] pred_data_base
/// word 2  [9:0] npu_input_base  [19:10] npu_output_base
///         [29:20] synthetic thermal  [39:30] synthetic voltage
///         [55:40] synthetic current
/// word 3  [23:0] synthetic_action_sequence  [25:24] store_pred_mode
///         [27:26] store_action_mode  [63:32] action_base
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct TopConfig {
    /// Start the top.
    pub start: bool,
    /// Enable the top.
    pub enable: bool,
    /// Stop request.
    pub stop: bool,
    /// Enable sensor collection.
    pub collect_en: bool,
    /// Collection mode select.
    pub collect_mode: bool,
    /// Enable prediction (raises the compute channel).
    pub pred_en: bool,
    /// Prediction mode select.
    pub pred_mode: bool,
    /// Enable the RL scheduler (raises the action channel).
    pub schedule_en: bool,
    /// Sensor store mode (2 bits).
    pub store_sensor_mode: u8,
    /// Action offset (5 bits).
    pub action_offset: u8,
    /// Number of iterations to run (17 bits).
    pub num_itr: u32,
    /// Sampling interval in top clock cycles.
    pub sampling_intvl: u32,
    /// Top-side sensor data base.
    pub sensor_data_base: u32,
    /// Top-side prediction base.
    pub pred_data_base: u32,
    /// NPU input buffer base (10 bits).
    pub npu_input_base: u16,
    /// NPU output buffer base (10 bits).
    pub npu_output_base: u16,
    /// Synthetic thermal encoding (10 bits).
    pub synthetic_thermal: u16,
    /// Synthetic voltage encoding (10 bits).
    pub synthetic_voltage: u16,
    /// Synthetic current encoding (16 bits).
    pub synthetic_current: u16,
    /// Synthetic action sequence (24 bits).
    pub synthetic_action_sequence: u32,
    /// Prediction store mode (2 bits).
    pub store_pred_mode: u8,
    /// Action store mode (2 bits).
    pub store_action_mode: u8,
    /// Top-side action base.
    pub action_base: u32,
}

impl Default for TopConfig {
    /// Boot configuration: collect and predict for ten iterations.
    fn default() -> Self {
        Self {
            start: true,
            enable: true,
            stop: false,
            collect_en: true,
            collect_mode: true,
            pred_en: true,
            pred_mode: false,
            schedule_en: false,
            store_sensor_mode: 3,
            action_offset: 4,
            num_itr: 10,
            sampling_intvl: 200,
            sensor_data_base: 0x1000,
            pred_data_base: 0x2000,
            npu_input_base: 0x10,
            npu_output_base: 0x5,
            synthetic_thermal: 10,
            synthetic_voltage: 30,
            synthetic_current: 20,
            synthetic_action_sequence: 342_391,
            store_pred_mode: 0,
            store_action_mode: 0,
            action_base: 0x2800,
        }
    }
}

const fn bit(flag: bool, pos: u32) -> u64 {
    (flag as u64) << pos
}

const fn field(value: u64, mask: u64, pos: u32) -> u64 {
    (value & mask) << pos
}

const fn extract(word: u64, mask: u64, pos: u32) -> u64 {
    (word >> pos) & mask
}

impl TopConfig {
    /// Largest iteration count the 17-bit field holds.
    pub const MAX_ITERATIONS: u32 = 0x1_FFFF;

    /// Order in which the words must be written.
    #[must_use]
    pub const fn write_order() -> [usize; 4] {
        [1, 2, 3, 0]
    }

    /// Pack into the four regfile words, truncating each field to its width.
    #[must_use]
    pub const fn to_words(&self) -> [u64; 4] {
        let w0 = bit(self.start, 0)
            | bit(self.enable, 1)
            | bit(self.stop, 2)
            | bit(self.collect_en, 3)
            | bit(self.collect_mode, 4)
            | bit(self.pred_en, 5)
            | bit(self.pred_mode, 6)
            | bit(self.schedule_en, 7)
            | field(self.store_sensor_mode as u64, 0x3, 8)
            | field(self.action_offset as u64, 0x1F, 10)
            | field(self.num_itr as u64, 0x1_FFFF, 15)
            | field(self.sampling_intvl as u64, 0xFFFF_FFFF, 32);
        let w1 = field(self.sensor_data_base as u64, 0xFFFF_FFFF, 0)
            | field(self.pred_data_base as u64, 0xFFFF_FFFF, 32);
        let w2 = field(self.npu_input_base as u64, 0x3FF, 0)
            | field(self.npu_output_base as u64, 0x3FF, 10)
            | field(self.synthetic_thermal as u64, 0x3FF, 20)
            | field(self.synthetic_voltage as u64, 0x3FF, 30)
            | field(self.synthetic_current as u64, 0xFFFF, 40);
        let w3 = field(self.synthetic_action_sequence as u64, 0xFF_FFFF, 0)
            | field(self.store_pred_mode as u64, 0x3, 24)
            | field(self.store_action_mode as u64, 0x3, 26)
            | field(self.action_base as u64, 0xFFFF_FFFF, 32);
        [w0, w1, w2, w3]
    }

    /// Decode the four regfile words. Reserved bits are ignored.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_words(words: [u64; 4]) -> Self {
        let [w0, w1, w2, w3] = words;
        Self {
            start: extract(w0, 1, 0) != 0,
            enable: extract(w0, 1, 1) != 0,
            stop: extract(w0, 1, 2) != 0,
            collect_en: extract(w0, 1, 3) != 0,
            collect_mode: extract(w0, 1, 4) != 0,
            pred_en: extract(w0, 1, 5) != 0,
            pred_mode: extract(w0, 1, 6) != 0,
            schedule_en: extract(w0, 1, 7) != 0,
            store_sensor_mode: extract(w0, 0x3, 8) as u8,
            action_offset: extract(w0, 0x1F, 10) as u8,
            num_itr: extract(w0, 0x1_FFFF, 15) as u32,
            sampling_intvl: extract(w0, 0xFFFF_FFFF, 32) as u32,
            sensor_data_base: extract(w1, 0xFFFF_FFFF, 0) as u32,
            pred_data_base: extract(w1, 0xFFFF_FFFF, 32) as u32,
            npu_input_base: extract(w2, 0x3FF, 0) as u16,
            npu_output_base: extract(w2, 0x3FF, 10) as u16,
            synthetic_thermal: extract(w2, 0x3FF, 20) as u16,
            synthetic_voltage: extract(w2, 0x3FF, 30) as u16,
            synthetic_current: extract(w2, 0xFFFF, 40) as u16,
            synthetic_action_sequence: extract(w3, 0xFF_FFFF, 0) as u32,
            store_pred_mode: extract(w3, 0x3, 24) as u8,
            store_action_mode: extract(w3, 0x3, 26) as u8,
            action_base: extract(w3, 0xFFFF_FFFF, 32) as u32,
        }
    }
}

// ── Standardization regfiles ─────────────────────────────────────────────────

/// Per-sensor quantization word for the hardware standardization unit.
///
/// `[15:0]` thermal mult, `[21:16]` thermal shift, `[29:22]` thermal zero
/// point, `[47:32]` power mult, `[53:48]` power shift, `[61:54]` power zero
/// point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantRegfileEntry {
    /// Thermal scale multiplier.
    pub thermal_mult: u16,
    /// Thermal scale shift (6 bits).
    pub thermal_shift: u8,
    /// Thermal zero point (two's complement byte).
    pub thermal_zero_point: i8,
    /// Power scale multiplier.
    pub power_mult: u16,
    /// Power scale shift (6 bits).
    pub power_shift: u8,
    /// Power zero point (two's complement byte).
    pub power_zero_point: i8,
}

impl QuantRegfileEntry {
    /// Pack into one regfile word.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn to_word(&self) -> u64 {
        field(self.thermal_mult as u64, 0xFFFF, 0)
            | field(self.thermal_shift as u64, 0x3F, 16)
            | field(self.thermal_zero_point as u8 as u64, 0xFF, 22)
            | field(self.power_mult as u64, 0xFFFF, 32)
            | field(self.power_shift as u64, 0x3F, 48)
            | field(self.power_zero_point as u8 as u64, 0xFF, 54)
    }
}

/// Per-sensor dequantization word: `[15:0]` scale, `[21:16]` shift,
/// `[29:22]` zero point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DequantRegfileEntry {
    /// Fixed-point scale.
    pub scale: u16,
    /// Scale shift (6 bits).
    pub shift: u8,
    /// Zero point (two's complement byte).
    pub zero_point: i8,
}

impl DequantRegfileEntry {
    /// Pack into one regfile word.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn to_word(&self) -> u64 {
        field(self.scale as u64, 0xFFFF, 0)
            | field(self.shift as u64, 0x3F, 16)
            | field(self.zero_point as u8 as u64, 0xFF, 22)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_config_words() {
        let words = TopConfig::default().to_words();
        assert_eq!(words[0], 0x0000_00C8_0005_133B);
        assert_eq!(words[1], 0x0000_2000_0000_1000);
        assert_eq!(words[2], 0x0000_1407_80A0_1410);
        assert_eq!(words[3], 0x0000_2800_0005_3977);
    }

    #[test]
    fn words_decode_to_same_config() {
        let cfg = TopConfig {
            schedule_en: true,
            num_itr: TopConfig::MAX_ITERATIONS,
            store_action_mode: 2,
            ..TopConfig::default()
        };
        assert_eq!(TopConfig::from_words(cfg.to_words()), cfg);
    }

    #[test]
    fn iteration_count_truncates_to_field() {
        let cfg = TopConfig {
            num_itr: TopConfig::MAX_ITERATIONS + 2,
            ..TopConfig::default()
        };
        assert_eq!(TopConfig::from_words(cfg.to_words()).num_itr, 1);
        // Overflow must not reach the sampling interval.
        assert_eq!(TopConfig::from_words(cfg.to_words()).sampling_intvl, 200);
    }

    #[test]
    fn start_word_written_last() {
        assert_eq!(TopConfig::write_order()[3], 0);
    }

    #[test]
    fn quant_entry_layout() {
        let e = QuantRegfileEntry {
            thermal_mult: 1,
            thermal_shift: 2,
            thermal_zero_point: -128,
            power_mult: 1,
            power_shift: 19,
            power_zero_point: -128,
        };
        let w = e.to_word();
        assert_eq!(w & 0xFFFF, 1);
        assert_eq!((w >> 16) & 0x3F, 2);
        assert_eq!((w >> 22) & 0xFF, 0x80);
        assert_eq!((w >> 32) & 0xFFFF, 1);
        assert_eq!((w >> 48) & 0x3F, 19);
        assert_eq!((w >> 54) & 0xFF, 0x80);
        assert_eq!(w >> 62, 0);
    }

    #[test]
    fn dequant_entry_reserved_bits_clear() {
        let e = DequantRegfileEntry {
            scale: 0xFFFF,
            shift: 0xFF,
            zero_point: -1,
        };
        assert_eq!(e.to_word(), 0x3FFF_FFFF);
    }
}
