// SPDX-License-Identifier: AGPL-3.0-only

//! Memory-bus abstraction over the chip's fixed addresses.
//!
//! Every pipeline stage talks to the chip through [`MemoryBus`], addressed
//! with absolute CPU addresses from [`therm_chip::map`]. Backends:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`PhysicalWindow`](crate::backends::PhysicalWindow) | `/dev/mem` mapping of the real window |
//! | [`FakeMemory`](crate::backends::FakeMemory) | Plain in-memory image for tests |
//! | [`SimulatedChip`](crate::backends::SimulatedChip) | In-memory image plus a thermal-top peer |
//!
//! [`MmioRegister`] gives a fixed address a word type so call sites cannot
//! read a 64-bit flag as 32 bits.

use std::marker::PhantomData;
use therm_chip::{map, Channel};

/// Word-addressed access to the chip.
///
/// Reads take `&mut self`: on a live device (or the simulated peer) a read
/// can have side effects.
///
/// Addresses outside the backend's window are a programming error; backends
/// panic rather than return an error.
pub trait MemoryBus {
    /// Read a 32-bit word.
    fn read_u32(&mut self, addr: usize) -> u32;
    /// Write a 32-bit word.
    fn write_u32(&mut self, addr: usize, value: u32);
    /// Read a 64-bit word.
    fn read_u64(&mut self, addr: usize) -> u64;
    /// Write a 64-bit word.
    fn write_u64(&mut self, addr: usize, value: u64);
}

impl<B: MemoryBus + ?Sized> MemoryBus for &mut B {
    fn read_u32(&mut self, addr: usize) -> u32 {
        (**self).read_u32(addr)
    }
    fn write_u32(&mut self, addr: usize, value: u32) {
        (**self).write_u32(addr, value);
    }
    fn read_u64(&mut self, addr: usize) -> u64 {
        (**self).read_u64(addr)
    }
    fn write_u64(&mut self, addr: usize, value: u64) {
        (**self).write_u64(addr, value);
    }
}

/// A word type a register can hold.
pub trait RegisterWord: Copy {
    /// Width in bytes.
    const BYTES: usize;
    /// Load from the bus.
    fn load<B: MemoryBus + ?Sized>(bus: &mut B, addr: usize) -> Self;
    /// Store to the bus.
    fn store<B: MemoryBus + ?Sized>(bus: &mut B, addr: usize, value: Self);
}

impl RegisterWord for u32 {
    const BYTES: usize = 4;
    fn load<B: MemoryBus + ?Sized>(bus: &mut B, addr: usize) -> Self {
        bus.read_u32(addr)
    }
    fn store<B: MemoryBus + ?Sized>(bus: &mut B, addr: usize, value: Self) {
        bus.write_u32(addr, value);
    }
}

impl RegisterWord for u64 {
    const BYTES: usize = 8;
    fn load<B: MemoryBus + ?Sized>(bus: &mut B, addr: usize) -> Self {
        bus.read_u64(addr)
    }
    fn store<B: MemoryBus + ?Sized>(bus: &mut B, addr: usize, value: Self) {
        bus.write_u64(addr, value);
    }
}

/// Typed handle for one fixed address.
#[derive(Debug, PartialEq, Eq)]
pub struct MmioRegister<T> {
    addr: usize,
    _word: PhantomData<T>,
}

impl<T> Clone for MmioRegister<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MmioRegister<T> {}

impl<T: RegisterWord> MmioRegister<T> {
    /// Register at an absolute address.
    pub const fn at(addr: usize) -> Self {
        Self {
            addr,
            _word: PhantomData,
        }
    }

    /// Absolute address.
    pub const fn addr(self) -> usize {
        self.addr
    }

    /// `index`-th element of an array of `T` starting here.
    pub const fn index(self, index: usize) -> Self {
        Self::at(self.addr + index * T::BYTES)
    }

    /// Read the register.
    pub fn read<B: MemoryBus + ?Sized>(self, bus: &mut B) -> T {
        T::load(bus, self.addr)
    }

    /// Write the register.
    pub fn write<B: MemoryBus + ?Sized>(self, bus: &mut B, value: T) {
        T::store(bus, self.addr, value);
    }
}

/// Typed registers for the shared window.
pub mod regs {
    use super::{map, Channel, MmioRegister};

    /// Start-flag word (written by the thermal top).
    pub const START_FLAG: MmioRegister<u64> = MmioRegister::at(map::CPU_START_FLAG);
    /// Finish-flag word (written by the CPU).
    pub const FINISH_FLAG: MmioRegister<u64> = MmioRegister::at(map::CPU_FINISH_FLAG);
    /// Top config regfile, word 0.
    pub const TOP_CONFIG: MmioRegister<u64> = MmioRegister::at(map::TOP_CONFIG_REGFILE_BASE);
    /// Quant regfile, entry 0.
    pub const QUANT_CONFIG: MmioRegister<u64> = MmioRegister::at(map::QUANT_CONFIG_REGFILE_BASE);
    /// Dequant regfile, entry 0.
    pub const DEQUANT_CONFIG: MmioRegister<u64> =
        MmioRegister::at(map::DEQUANT_CONFIG_REGFILE_BASE);
    /// Calibration weight buffer, word 0.
    pub const SENSOR_WEIGHTS: MmioRegister<u64> = MmioRegister::at(map::SENSOR_WEIGHT_BUFFER_BASE);
    /// Frequency buffer, sensor 0.
    pub const FREQUENCY: MmioRegister<u32> = MmioRegister::at(map::SENSOR_FREQ_BUFFER_BASE);
    /// Power-switch code buffer, sensor 0.
    pub const PS_CODE: MmioRegister<u32> = MmioRegister::at(map::PS_CODE_BUFFER_BASE);
    /// Sensor-data buffer, sensor 0.
    pub const SENSOR_DATA: MmioRegister<u64> = MmioRegister::at(map::SENSOR_DATA_BASE);
    /// Prediction buffer, sensor 0.
    pub const PREDICTION: MmioRegister<u64> = MmioRegister::at(map::SENSOR_PRED_BASE);
    /// Scheduler action word.
    pub const ACTION: MmioRegister<u64> = MmioRegister::at(map::RL_ACTION_BASE);

    /// Hardware cycle counter for a channel.
    pub const fn cycle_counter(channel: Channel) -> MmioRegister<u64> {
        MmioRegister::at(map::perf_counter(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::FakeMemory;

    #[test]
    fn indexed_registers_use_word_stride() {
        assert_eq!(regs::FREQUENCY.index(3).addr(), map::freq_word(3));
        assert_eq!(regs::SENSOR_DATA.index(3).addr(), map::record_word(3));
        assert_eq!(regs::PREDICTION.index(13).addr(), map::prediction_word(13));
        assert_eq!(
            regs::cycle_counter(Channel::StorePrediction).addr(),
            map::PERF_COUNTER_BASE + 16
        );
    }

    #[test]
    fn typed_access_through_bus() {
        let mut mem = FakeMemory::shared_window();
        regs::START_FLAG.write(&mut mem, Channel::Compute.start_sentinel());
        regs::FREQUENCY.index(1).write(&mut mem, 0xDEAD_BEEF);
        assert_eq!(regs::START_FLAG.read(&mut mem), 0xA5A5_A5A5);
        assert_eq!(mem.read_u32(map::freq_word(1)), 0xDEAD_BEEF);
        // Neighbouring words untouched.
        assert_eq!(regs::FREQUENCY.read(&mut mem), 0);
        assert_eq!(regs::FINISH_FLAG.read(&mut mem), 0);
    }
}
