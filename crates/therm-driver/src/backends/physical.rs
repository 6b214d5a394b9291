// SPDX-License-Identifier: AGPL-3.0-only

//! Physical-memory window over `/dev/mem`
//!
//! The only unsafe code in the crate: one `mmap`, volatile loads and stores,
//! and the matching `munmap` in `Drop`. Every access is bounds-checked
//! against the requested window before the pointer is touched.

use crate::error::{Result, ThermError};
use crate::mmio::MemoryBus;
use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::ptr::NonNull;
use therm_chip::map;

/// Mapping granularity.
const PAGE_SIZE: usize = 4096;

/// Default device node.
pub const DEV_MEM: &str = "/dev/mem";

/// `[base, base + size)` of physical memory mapped into this process.
///
/// Addresses passed to [`MemoryBus`] methods are absolute physical
/// addresses, not offsets.
#[derive(Debug)]
pub struct PhysicalWindow {
    ptr: NonNull<u8>,
    map_len: usize,
    /// Distance from the mapping start to `base` (base need not be page aligned).
    page_offset: usize,
    base: usize,
    size: usize,
    _fd: OwnedFd,
}

impl PhysicalWindow {
    /// Map the shared thermal window from `/dev/mem`.
    ///
    /// # Errors
    ///
    /// Returns an error if `/dev/mem` cannot be opened (usually missing
    /// privileges) or the mapping is refused.
    pub fn shared() -> Result<Self> {
        Self::open(DEV_MEM, map::SHARED_WINDOW_BASE, map::SHARED_WINDOW_SIZE)
    }

    /// Map `size` bytes of physical memory starting at `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero, the device node cannot be opened,
    /// or `mmap` fails.
    pub fn open(path: &str, base: usize, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ThermError::map_failed("window size is 0"));
        }

        let fd = rustix::fs::open(path, OFlags::RDWR | OFlags::SYNC, Mode::empty())
            .map_err(|e| ThermError::map_failed(format!("cannot open {path}: {e}")))?;

        let aligned = base & !(PAGE_SIZE - 1);
        let page_offset = base - aligned;
        let map_len = (page_offset + size).div_ceil(PAGE_SIZE) * PAGE_SIZE;

        tracing::debug!("Mapping {path} [{base:#x}, {:#x})", base + size);

        // SAFETY: mmap with validated arguments:
        // - fd is open read/write on the device node
        // - map_len is non-zero and page-granular
        // - offset `aligned` is page aligned
        // - MAP_SHARED so stores reach the device
        // - fd is kept in the struct for the mapping's lifetime, unmapped in Drop
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                aligned as u64,
            )
        }
        .map_err(|e| ThermError::map_failed(format!("mmap of {base:#x} failed: {e}")))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| ThermError::map_failed("mmap returned a null pointer"))?;

        tracing::info!("Mapped {size:#x} bytes of physical memory at {base:#x} ({ptr:p})");

        Ok(Self {
            ptr,
            map_len,
            page_offset,
            base,
            size,
            _fd: fd,
        })
    }

    /// Physical base address.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Window length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Pointer for `width` bytes at physical `addr`.
    fn slot(&self, addr: usize, width: usize) -> *mut u8 {
        assert!(
            addr >= self.base && addr + width <= self.base + self.size,
            "Physical address {addr:#x} outside mapped window"
        );
        assert!(addr % width == 0, "Unaligned access at {addr:#x}");
        // SAFETY: addr lies inside [base, base + size), which lies inside the
        // mapping at page_offset; the resulting pointer stays in bounds.
        unsafe { self.ptr.as_ptr().add(self.page_offset + (addr - self.base)) }
    }
}

impl MemoryBus for PhysicalWindow {
    #[allow(clippy::cast_ptr_alignment)]
    fn read_u32(&mut self, addr: usize) -> u32 {
        let p = self.slot(addr, 4).cast::<u32>();
        // SAFETY: p is in bounds and 4-byte aligned (checked in slot);
        // volatile because the thermal top writes this memory.
        unsafe { p.read_volatile() }
    }

    #[allow(clippy::cast_ptr_alignment)]
    fn write_u32(&mut self, addr: usize, value: u32) {
        let p = self.slot(addr, 4).cast::<u32>();
        // SAFETY: as in read_u32; volatile so the store is not elided.
        unsafe { p.write_volatile(value) }
    }

    #[allow(clippy::cast_ptr_alignment)]
    fn read_u64(&mut self, addr: usize) -> u64 {
        let p = self.slot(addr, 8).cast::<u64>();
        // SAFETY: p is in bounds and 8-byte aligned (checked in slot).
        unsafe { p.read_volatile() }
    }

    #[allow(clippy::cast_ptr_alignment)]
    fn write_u64(&mut self, addr: usize, value: u64) {
        let p = self.slot(addr, 8).cast::<u64>();
        // SAFETY: p is in bounds and 8-byte aligned (checked in slot).
        unsafe { p.write_volatile(value) }
    }
}

impl Drop for PhysicalWindow {
    fn drop(&mut self) {
        // SAFETY: ptr and map_len are exactly what mmap returned and were
        // given; no references into the mapping outlive self.
        if let Err(e) = unsafe { munmap(self.ptr.as_ptr().cast(), self.map_len) } {
            tracing::warn!("munmap of {:#x} failed: {e}", self.base);
        }
    }
}

// SAFETY: the mapping is owned exclusively by this value and every access
// goes through &mut self.
unsafe impl Send for PhysicalWindow {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_rejected() {
        let err = PhysicalWindow::open(DEV_MEM, map::SHARED_WINDOW_BASE, 0).unwrap_err();
        assert!(matches!(err, ThermError::MapFailed { .. }));
    }

    #[test]
    fn missing_device_node_reported() {
        let err = PhysicalWindow::open("/nonexistent/therm-mem", 0x6000_0000, 64).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/therm-mem"), "{err}");
    }
}
