// SPDX-License-Identifier: AGPL-3.0-only

//! CPU-visible address map.
//!
//! Every buffer the thermal top shares with the CPU sits at a fixed address
//! in the `0x6000_0000` window. Word widths are noted per entry; strides are
//! the natural size of the word.
//!
//! ```text
//! 0x6000_0000  RL config regfile          3 × u64
//! 0x6000_0018  Q-table 0                  512 × u64
//! 0x6000_1018  Q-table 1                  512 × u64
//! 0x6000_2018  Quant config regfile       16 × u64
//! 0x6000_2118  Dequant config regfile     16 × u64
//! 0x6000_2218  Top config regfile         4 × u64
//! 0x6000_2238  Sensor weight buffer       22 × i64
//! 0x6000_2338  Frequency buffer           u32 per sensor
//! 0x6000_2378  Power-switch code buffer   u32 per sensor
//! 0x6000_5000  Sensor-data buffer         u64 per sensor
//! 0x6000_6000  Prediction buffer          u64 per sensor
//! 0x6000_6100  Action buffer              u64
//! 0x6000_7000  CPU start flag             u64
//! 0x6000_7008  CPU finish flag            u64
//! 0x6000_8000  HW cycle counters          4 × u64
//! ```

use crate::flags::Channel;

// ── Register files ───────────────────────────────────────────────────────────

/// Reinforcement-learning scheduler config regfile (3 words).
pub const RL_CONFIG_REGFILE_BASE: usize = 0x6000_0000;
/// Q-table 0 base.
pub const Q_TABLE_0_BASE: usize = 0x6000_0018;
/// Q-table 1 base.
pub const Q_TABLE_1_BASE: usize = 0x6000_1018;
/// Per-sensor quantization config words.
pub const QUANT_CONFIG_REGFILE_BASE: usize = 0x6000_2018;
/// Per-sensor dequantization config words.
pub const DEQUANT_CONFIG_REGFILE_BASE: usize = 0x6000_2118;
/// Thermal-top control regfile (4 words, word 0 carries the start bit).
pub const TOP_CONFIG_REGFILE_BASE: usize = 0x6000_2218;
/// Number of words in the top config regfile.
pub const TOP_CONFIG_WORDS: usize = 4;
/// Number of entries in each of the quant/dequant regfiles.
pub const STANDARDIZATION_ENTRIES: usize = 16;

// ── Sensor buffers ───────────────────────────────────────────────────────────

/// Calibration weight buffer: current[10], voltage[6], thermal[6] as i64.
pub const SENSOR_WEIGHT_BUFFER_BASE: usize = 0x6000_2238;
/// Number of i64 words in the calibration weight buffer.
pub const SENSOR_WEIGHT_WORDS: usize = 22;
/// Packed `FrequencyTriple` words, one u32 per sensor.
pub const SENSOR_FREQ_BUFFER_BASE: usize = 0x6000_2338;
/// Power-switch codes, one u32 per sensor.
pub const PS_CODE_BUFFER_BASE: usize = 0x6000_2378;
/// Packed `SensorRecord` words, one u64 per sensor.
pub const SENSOR_DATA_BASE: usize = 0x6000_5000;
/// Dequantized thermal predictions, one u64 per sensor.
pub const SENSOR_PRED_BASE: usize = 0x6000_6000;
/// Scheduler action word.
pub const RL_ACTION_BASE: usize = 0x6000_6100;

// ── Handshake ────────────────────────────────────────────────────────────────

/// Word the thermal top writes a channel's start sentinel into.
pub const CPU_START_FLAG: usize = 0x6000_7000;
/// Word the CPU writes a channel's finish sentinel into.
pub const CPU_FINISH_FLAG: usize = 0x6000_7008;

// ── Performance counters ─────────────────────────────────────────────────────

/// Hardware cycle counters, one u64 per channel.
pub const PERF_COUNTER_BASE: usize = 0x6000_8000;

/// Hardware cycle counter address for a channel.
#[must_use]
pub const fn perf_counter(channel: Channel) -> usize {
    PERF_COUNTER_BASE + 8 * channel.index()
}

// ── Power switches ───────────────────────────────────────────────────────────

/// Power-switch control registers (two u64, seven 8-bit switches each).
pub const POWER_SWITCH_BASE: usize = 0x40D0_0000;

/// Lowest address of the shared `0x6000_0000` window.
pub const SHARED_WINDOW_BASE: usize = RL_CONFIG_REGFILE_BASE;
/// Size of the shared window, through the last cycle counter.
pub const SHARED_WINDOW_SIZE: usize = PERF_COUNTER_BASE + 4 * 8 - SHARED_WINDOW_BASE;

/// Address of a sensor's frequency word.
#[must_use]
pub const fn freq_word(sensor: usize) -> usize {
    SENSOR_FREQ_BUFFER_BASE + 4 * sensor
}

/// Address of a sensor's power-switch code word.
#[must_use]
pub const fn ps_code_word(sensor: usize) -> usize {
    PS_CODE_BUFFER_BASE + 4 * sensor
}

/// Address of a sensor's record word.
#[must_use]
pub const fn record_word(sensor: usize) -> usize {
    SENSOR_DATA_BASE + 8 * sensor
}

/// Address of a sensor's prediction word.
#[must_use]
pub const fn prediction_word(sensor: usize) -> usize {
    SENSOR_PRED_BASE + 8 * sensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NUM_SENSORS;

    #[test]
    fn buffers_do_not_overlap() {
        assert!(SENSOR_WEIGHT_BUFFER_BASE + 8 * SENSOR_WEIGHT_WORDS <= SENSOR_FREQ_BUFFER_BASE);
        assert!(freq_word(NUM_SENSORS) <= PS_CODE_BUFFER_BASE);
        assert!(ps_code_word(NUM_SENSORS) <= SENSOR_DATA_BASE);
        assert!(record_word(NUM_SENSORS) <= SENSOR_PRED_BASE);
        assert!(prediction_word(NUM_SENSORS) <= RL_ACTION_BASE);
        assert!(TOP_CONFIG_REGFILE_BASE + 8 * TOP_CONFIG_WORDS <= SENSOR_WEIGHT_BUFFER_BASE);
    }

    #[test]
    fn flags_are_adjacent_words() {
        assert_eq!(CPU_FINISH_FLAG - CPU_START_FLAG, 8);
    }

    #[test]
    fn window_covers_counters() {
        let last = perf_counter(Channel::StoreAction) + 8;
        assert_eq!(SHARED_WINDOW_BASE + SHARED_WINDOW_SIZE, last);
    }
}
