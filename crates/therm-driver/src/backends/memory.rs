// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory stand-in for a physical window.

use crate::mmio::MemoryBus;
use therm_chip::map;

/// Zero-initialised little-endian image of `[base, base + len)`.
///
/// Behaves like the chip's SRAM with nothing on the other side: words read
/// back exactly what was last written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeMemory {
    base: usize,
    bytes: Vec<u8>,
    writes: u64,
}

impl FakeMemory {
    /// Image of `len` bytes at `base`.
    pub fn new(base: usize, len: usize) -> Self {
        Self {
            base,
            bytes: vec![0; len],
            writes: 0,
        }
    }

    /// Image covering the whole shared window.
    pub fn shared_window() -> Self {
        Self::new(map::SHARED_WINDOW_BASE, map::SHARED_WINDOW_SIZE)
    }

    /// Base address.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Window length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Stores performed since construction.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    fn range(&self, addr: usize, width: usize) -> std::ops::Range<usize> {
        assert!(
            addr >= self.base && addr + width <= self.base + self.bytes.len(),
            "Address {addr:#x} outside fake window"
        );
        let start = addr - self.base;
        start..start + width
    }
}

impl MemoryBus for FakeMemory {
    fn read_u32(&mut self, addr: usize) -> u32 {
        let r = self.range(addr, 4);
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.bytes[r]);
        u32::from_le_bytes(b)
    }

    fn write_u32(&mut self, addr: usize, value: u32) {
        let r = self.range(addr, 4);
        self.bytes[r].copy_from_slice(&value.to_le_bytes());
        self.writes += 1;
    }

    fn read_u64(&mut self, addr: usize) -> u64 {
        let r = self.range(addr, 8);
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.bytes[r]);
        u64::from_le_bytes(b)
    }

    fn write_u64(&mut self, addr: usize, value: u64) {
        let r = self.range(addr, 8);
        self.bytes[r].copy_from_slice(&value.to_le_bytes());
        self.writes += 1;
    }
}
