// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated thermal top.
//!
//! An in-memory chip image with a hardware peer attached. The peer advances
//! only when the CPU touches the handshake words, so a single-threaded test
//! sees exactly the interleaving real silicon would produce:
//!
//! ```text
//! boot:       wait for start|enable in top config word 0
//! iteration:  write frequency + ps-code buffers
//!             raise store-sensor → compute (pred_en) → store-pred (pred_en)
//!                                → store-action (schedule_en)
//! each raise: wait for the matching finish sentinel, latch the cycle
//!             counter, release the flag words per FlagRelease
//! ```
//!
//! "Cycles" are bus accesses made by the CPU while the channel was raised.
//! The peer steps on every CPU read of either flag word and after every
//! write to the finish word.

use crate::backends::FakeMemory;
use crate::mmio::{regs, MemoryBus};
use therm_chip::{map, Channel, FrequencyTriple, TopConfig, NUM_SENSORS};
use tracing::{debug, info};

/// Frequency samples the peer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stimulus {
    /// Same triple and power-switch code for every sensor and iteration.
    Constant {
        /// Oscillator counts.
        triple: FrequencyTriple,
        /// Power-switch code.
        ps_code: u32,
    },
    /// Counts rising by `step` per iteration and per sensor index.
    ///
    /// f0 grows by `step`, f1 and f2 by `2 × step`, so `f3` stays fixed.
    Ramp {
        /// Counts at iteration 0, sensor 0.
        base: FrequencyTriple,
        /// Increment.
        step: u16,
        /// Power-switch code.
        ps_code: u32,
    },
}

impl Stimulus {
    /// Sample for `sensor` at `iteration`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample(&self, iteration: u32, sensor: usize) -> (FrequencyTriple, u32) {
        match *self {
            Self::Constant { triple, ps_code } => (triple, ps_code),
            Self::Ramp {
                base,
                step,
                ps_code,
            } => {
                let k = (iteration as usize + sensor) as u32 * u32::from(step);
                let f0 = (u32::from(base.f0) + k) as u16;
                let f1 = (u32::from(base.f1) + 2 * k) as u16;
                let f2 = (u32::from(base.f2) + 2 * k) as u16;
                (FrequencyTriple::new(f0, f1, f2), ps_code)
            }
        }
    }
}

impl Default for Stimulus {
    /// `(10, 20, 21)` with power-switch code 1.
    fn default() -> Self {
        Self::Constant {
            triple: FrequencyTriple::new(10, 20, 21),
            ps_code: 1,
        }
    }
}

/// When the peer hands the flag words back after a finish sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagRelease {
    /// Zero both flag words as soon as the finish sentinel is seen.
    #[default]
    ClearOnFinish,
    /// Leave both words as they are; the finish word is consumed when the
    /// next start sentinel is raised. The start word may repeat.
    HoldUntilRaise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Boot,
    Pending { channel: Channel, delay: u32 },
    Raised(Channel),
    Done,
}

/// Chip image plus thermal-top peer.
#[derive(Debug, Clone)]
pub struct SimulatedChip {
    mem: FakeMemory,
    stimulus: Stimulus,
    num_sensors: usize,
    raise_delay: u32,
    release: FlagRelease,
    phase: Phase,
    config: TopConfig,
    iteration: u32,
    cycles: u64,
    rounds: [u64; 4],
}

impl SimulatedChip {
    /// Peer driving `stimulus` into 14 sensors.
    ///
    /// A flag becomes due on the poll that completes the previous step and
    /// is raised on the next one.
    pub fn new(stimulus: Stimulus) -> Self {
        Self {
            mem: FakeMemory::shared_window(),
            stimulus,
            num_sensors: NUM_SENSORS,
            raise_delay: 0,
            release: FlagRelease::default(),
            phase: Phase::Boot,
            config: TopConfig::default(),
            iteration: 0,
            cycles: 0,
            rounds: [0; 4],
        }
    }

    /// Number of sensors to populate.
    #[must_use]
    pub fn with_num_sensors(mut self, num_sensors: usize) -> Self {
        self.num_sensors = num_sensors;
        self
    }

    /// Polls the peer lets pass before raising each start sentinel.
    #[must_use]
    pub fn with_raise_delay(mut self, polls: u32) -> Self {
        self.raise_delay = polls;
        self
    }

    /// How flag words are released after each round.
    #[must_use]
    pub fn with_flag_release(mut self, release: FlagRelease) -> Self {
        self.release = release;
        self
    }

    /// Underlying image.
    pub fn memory(&self) -> &FakeMemory {
        &self.mem
    }

    /// Iterations completed.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Whether the configured iteration count has been reached.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Channel whose start sentinel is currently raised.
    pub fn raised(&self) -> Option<Channel> {
        match self.phase {
            Phase::Raised(c) => Some(c),
            _ => None,
        }
    }

    /// Completed rounds on a channel.
    pub fn rounds(&self, channel: Channel) -> u64 {
        self.rounds[channel.index()]
    }

    /// Configuration latched at boot.
    pub fn config(&self) -> &TopConfig {
        &self.config
    }

    fn step(&mut self) {
        match self.phase {
            Phase::Boot => {
                let words = std::array::from_fn(|i| regs::TOP_CONFIG.index(i).read(&mut self.mem));
                let cfg = TopConfig::from_words(words);
                if cfg.start && cfg.enable && !cfg.stop {
                    info!(num_itr = cfg.num_itr, "Simulated thermal top started");
                    self.config = cfg;
                    self.iteration = 0;
                    self.begin_iteration();
                }
            }
            Phase::Pending { channel, delay: 0 } => self.raise(channel),
            Phase::Pending { channel, delay } => {
                self.phase = Phase::Pending {
                    channel,
                    delay: delay - 1,
                };
            }
            Phase::Raised(channel) => {
                if regs::FINISH_FLAG.read(&mut self.mem) == channel.finish_sentinel() {
                    self.acknowledge(channel);
                }
            }
            Phase::Done => {}
        }
    }

    fn begin_iteration(&mut self) {
        if self.iteration >= self.config.num_itr {
            info!(iterations = self.iteration, "Simulated thermal top finished");
            regs::FINISH_FLAG.write(&mut self.mem, 0);
            self.phase = Phase::Done;
            return;
        }
        for i in 0..self.num_sensors {
            let (triple, ps_code) = self.stimulus.sample(self.iteration, i);
            regs::FREQUENCY.index(i).write(&mut self.mem, triple.pack());
            regs::PS_CODE.index(i).write(&mut self.mem, ps_code);
        }
        self.schedule(Channel::StoreSensor);
    }

    fn schedule(&mut self, channel: Channel) {
        self.phase = Phase::Pending {
            channel,
            delay: self.raise_delay,
        };
    }

    fn raise(&mut self, channel: Channel) {
        if channel == Channel::StoreAction {
            let action = u64::from(self.config.synthetic_action_sequence) + u64::from(self.iteration);
            regs::ACTION.write(&mut self.mem, action);
        }
        debug!(%channel, iteration = self.iteration, "raise");
        self.cycles = 0;
        regs::FINISH_FLAG.write(&mut self.mem, 0);
        regs::START_FLAG.write(&mut self.mem, channel.start_sentinel());
        self.phase = Phase::Raised(channel);
    }

    fn acknowledge(&mut self, channel: Channel) {
        if self.release == FlagRelease::ClearOnFinish {
            regs::START_FLAG.write(&mut self.mem, 0);
            regs::FINISH_FLAG.write(&mut self.mem, 0);
        }
        regs::cycle_counter(channel).write(&mut self.mem, self.cycles);
        self.rounds[channel.index()] += 1;

        let pred = self.config.pred_en;
        match channel {
            Channel::StoreSensor if pred => self.schedule(Channel::Compute),
            Channel::Compute => self.schedule(Channel::StorePrediction),
            Channel::StoreSensor | Channel::StorePrediction if self.config.schedule_en => {
                self.schedule(Channel::StoreAction);
            }
            _ => {
                self.iteration += 1;
                self.begin_iteration();
            }
        }
    }

    fn tick(&mut self) {
        if matches!(self.phase, Phase::Raised(_)) {
            self.cycles += 1;
        }
    }
}

impl MemoryBus for SimulatedChip {
    fn read_u32(&mut self, addr: usize) -> u32 {
        self.tick();
        self.mem.read_u32(addr)
    }

    fn write_u32(&mut self, addr: usize, value: u32) {
        self.tick();
        self.mem.write_u32(addr, value);
    }

    fn read_u64(&mut self, addr: usize) -> u64 {
        self.tick();
        if addr == map::CPU_START_FLAG || addr == map::CPU_FINISH_FLAG {
            self.step();
        }
        self.mem.read_u64(addr)
    }

    fn write_u64(&mut self, addr: usize, value: u64) {
        self.tick();
        self.mem.write_u64(addr, value);
        if addr == map::CPU_FINISH_FLAG {
            self.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot(chip: &mut SimulatedChip, cfg: &TopConfig) {
        let words = cfg.to_words();
        for i in TopConfig::write_order() {
            regs::TOP_CONFIG.index(i).write(chip, words[i]);
        }
    }

    fn await_raise(chip: &mut SimulatedChip) -> u64 {
        for _ in 0..4 {
            let word = regs::START_FLAG.read(chip);
            if word != 0 {
                return word;
            }
        }
        0
    }

    fn serve(chip: &mut SimulatedChip, expected: Channel) {
        assert_eq!(await_raise(chip), expected.start_sentinel());
        regs::FINISH_FLAG.write(chip, expected.finish_sentinel());
        assert!(chip.raised().is_none(), "{expected} not acknowledged");
        assert_eq!(chip.memory().clone().read_u64(map::CPU_START_FLAG), 0);
    }

    #[test]
    fn idle_until_started() {
        let mut chip = SimulatedChip::new(Stimulus::default());
        for _ in 0..10 {
            assert_eq!(regs::START_FLAG.read(&mut chip), 0);
        }
        assert!(chip.raised().is_none());
    }

    #[test]
    fn raises_channels_in_pipeline_order() {
        let mut chip = SimulatedChip::new(Stimulus::default());
        let cfg = TopConfig {
            num_itr: 2,
            schedule_en: true,
            ..TopConfig::default()
        };
        boot(&mut chip, &cfg);
        for _ in 0..2 {
            serve(&mut chip, Channel::StoreSensor);
            serve(&mut chip, Channel::Compute);
            serve(&mut chip, Channel::StorePrediction);
            serve(&mut chip, Channel::StoreAction);
        }
        assert!(chip.is_done());
        assert_eq!(chip.iteration(), 2);
        assert_eq!(chip.rounds(Channel::Compute), 2);
    }

    #[test]
    fn prediction_disabled_skips_compute() {
        let mut chip = SimulatedChip::new(Stimulus::default());
        let cfg = TopConfig {
            num_itr: 2,
            pred_en: false,
            ..TopConfig::default()
        };
        boot(&mut chip, &cfg);
        serve(&mut chip, Channel::StoreSensor);
        serve(&mut chip, Channel::StoreSensor);
        assert!(chip.is_done());
        assert_eq!(chip.rounds(Channel::Compute), 0);
    }

    #[test]
    fn held_flags_are_consumed_on_next_raise() {
        let mut chip = SimulatedChip::new(Stimulus::default())
            .with_flag_release(FlagRelease::HoldUntilRaise)
            .with_raise_delay(2);
        let cfg = TopConfig {
            num_itr: 2,
            pred_en: false,
            ..TopConfig::default()
        };
        boot(&mut chip, &cfg);
        while regs::START_FLAG.read(&mut chip) == 0 {}
        let finish = Channel::StoreSensor.finish_sentinel();
        regs::FINISH_FLAG.write(&mut chip, finish);
        assert_eq!(chip.rounds(Channel::StoreSensor), 1);

        // Both words stay put while the next raise is pending.
        let mut held = 0;
        while regs::FINISH_FLAG.read(&mut chip) == finish {
            assert_eq!(
                chip.memory().clone().read_u64(map::CPU_START_FLAG),
                Channel::StoreSensor.start_sentinel()
            );
            held += 1;
        }
        assert_eq!(held, 2);
        assert_eq!(chip.raised(), Some(Channel::StoreSensor));

        regs::FINISH_FLAG.write(&mut chip, finish);
        assert!(chip.is_done());
        assert_eq!(chip.memory().clone().read_u64(map::CPU_FINISH_FLAG), 0);
    }

    #[test]
    fn wrong_finish_sentinel_is_ignored() {
        let mut chip = SimulatedChip::new(Stimulus::default());
        boot(&mut chip, &TopConfig::default());
        assert_eq!(await_raise(&mut chip), Channel::StoreSensor.start_sentinel());
        regs::FINISH_FLAG.write(&mut chip, Channel::Compute.finish_sentinel());
        assert_eq!(regs::START_FLAG.read(&mut chip), Channel::StoreSensor.start_sentinel());
        assert_eq!(chip.raised(), Some(Channel::StoreSensor));
    }

    #[test]
    fn samples_and_cycles_land_in_memory() {
        let mut chip = SimulatedChip::new(Stimulus::default()).with_raise_delay(3);
        boot(&mut chip, &TopConfig::default());
        let mut polls = 0;
        while regs::START_FLAG.read(&mut chip) != Channel::StoreSensor.start_sentinel() {
            polls += 1;
        }
        assert_eq!(polls, 4);
        assert_eq!(
            FrequencyTriple::unpack(regs::FREQUENCY.index(13).read(&mut chip)),
            FrequencyTriple::new(10, 20, 21)
        );
        assert_eq!(regs::PS_CODE.index(13).read(&mut chip), 1);
        regs::FINISH_FLAG.write(&mut chip, Channel::StoreSensor.finish_sentinel());
        // Two reads and the finish write happened while raised.
        assert_eq!(regs::cycle_counter(Channel::StoreSensor).read(&mut chip), 3);
    }

    #[test]
    fn ramp_keeps_f3_fixed() {
        let s = Stimulus::Ramp {
            base: FrequencyTriple::new(100, 200, 230),
            step: 3,
            ps_code: 32,
        };
        let (t, ps) = s.sample(4, 2);
        assert_eq!(t, FrequencyTriple::new(118, 236, 266));
        assert_eq!(t.f3(), Some(30));
        assert_eq!(ps, 32);
    }
}
