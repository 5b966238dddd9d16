//! External RAM Gateway
//!
//! Off-chip pseudo-static RAM behind a serial link. The host reaches it only
//! through blocking `read`/`write` calls on an allocated region; the cluster
//! reaches it through a DMA channel bound to a [`RamWindow`].

use crate::error::{OffloadError, Result};
use crate::platform::dma::Memory;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Default device size (8 MiB).
pub const DEFAULT_RAM_SIZE: usize = 8 * 1024 * 1024;

/// Allocation granularity.
const RAM_ALIGN: usize = 4;

/// Device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamConf {
    /// Device size in bytes. Addresses are 32-bit.
    pub size: usize,
}

impl Default for RamConf {
    fn default() -> Self {
        Self {
            size: DEFAULT_RAM_SIZE,
        }
    }
}

/// Allocated block of external RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamRegion {
    addr: u32,
    len: usize,
}

impl RamRegion {
    /// Region at a raw device address, for callers that only carry addresses.
    #[must_use]
    pub const fn from_raw(addr: u32, len: usize) -> Self {
        Self { addr, len }
    }

    /// Device address of the first byte.
    #[must_use]
    pub const fn addr(&self) -> u32 {
        self.addr
    }

    /// Usable length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Zero-length region.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn reserved(&self) -> Result<usize> {
        reserved_len(self.len)
    }
}

/// Bytes actually taken from the free list for a `len` byte region.
fn reserved_len(len: usize) -> Result<usize> {
    len.max(1)
        .checked_next_multiple_of(RAM_ALIGN)
        .ok_or_else(|| OffloadError::ram_fault(format!("region length {len} overflows")))
}

#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    addr: usize,
    len: usize,
}

struct RamInner {
    mem: Vec<u8>,
    free: Vec<FreeBlock>,
    open: bool,
}

// =============================================================================
// DEVICE
// =============================================================================

/// An opened external RAM device.
pub struct RamDevice {
    size: usize,
    inner: Mutex<RamInner>,
}

impl RamDevice {
    /// Power up the device and clear it.
    ///
    /// # Errors
    /// Returns `RamOpen` if the size is zero or does not fit a 32-bit address space.
    pub fn open(conf: &RamConf) -> Result<Self> {
        if conf.size == 0 || u32::try_from(conf.size).is_err() {
            warn!(size = conf.size, "rejecting external RAM size");
            return Err(OffloadError::RamOpen {
                reason: format!("unsupported device size {}", conf.size),
            });
        }
        info!(size = conf.size, "external RAM opened");
        Ok(Self {
            size: conf.size,
            inner: Mutex::new(RamInner {
                mem: vec![0u8; conf.size],
                free: vec![FreeBlock {
                    addr: 0,
                    len: conf.size,
                }],
                open: true,
            }),
        })
    }

    /// Device size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// First-fit allocation of `len` bytes.
    ///
    /// # Errors
    /// Returns `RamExhausted` when no free block is large enough, or
    /// `RamFault` if `len` cannot be rounded to the allocation granularity.
    pub fn alloc(&self, len: usize) -> Result<RamRegion> {
        let mut inner = self.lock()?;
        let want = reserved_len(len)?;

        let Some(pos) = inner.free.iter().position(|b| b.len >= want) else {
            let largest = inner.free.iter().map(|b| b.len).max().unwrap_or(0);
            return Err(OffloadError::RamExhausted {
                requested: len,
                largest,
            });
        };

        let block = &mut inner.free[pos];
        let addr = block.addr;
        block.addr += want;
        block.len -= want;
        if block.len == 0 {
            inner.free.remove(pos);
        }

        let addr = u32::try_from(addr).map_err(|_| OffloadError::ram_fault("address overflow"))?;
        debug!(addr, len, "external RAM alloc");
        Ok(RamRegion { addr, len })
    }

    /// Return a region to the free list, merging with its neighbours.
    ///
    /// # Errors
    /// Returns `RamFault` if the region overlaps free space (double free) or
    /// reaches past the end of the device.
    pub fn free(&self, region: RamRegion) -> Result<()> {
        let mut inner = self.lock()?;
        let addr = region.addr as usize;
        let len = region.reserved()?;
        let end = addr
            .checked_add(len)
            .filter(|&end| end <= self.size)
            .ok_or_else(|| {
                OffloadError::ram_fault(format!("free of {addr:#x}+{len} leaves the device"))
            })?;

        let pos = inner.free.partition_point(|b| b.addr < addr);
        let overlaps_prev = pos > 0 && {
            let prev = inner.free[pos - 1];
            prev.addr + prev.len > addr
        };
        let overlaps_next = inner.free.get(pos).is_some_and(|next| end > next.addr);
        if overlaps_prev || overlaps_next {
            return Err(OffloadError::ram_fault(format!(
                "free of {addr:#x}+{len} overlaps free space"
            )));
        }

        let free = &mut inner.free;
        free.insert(pos, FreeBlock { addr, len });
        if pos + 1 < free.len() && free[pos].addr + free[pos].len == free[pos + 1].addr {
            free[pos].len += free[pos + 1].len;
            free.remove(pos + 1);
        }
        if pos > 0 && free[pos - 1].addr + free[pos - 1].len == free[pos].addr {
            free[pos - 1].len += free[pos].len;
            free.remove(pos);
        }
        debug!(addr, len, "external RAM free");
        Ok(())
    }

    /// Blocking copy from `region[offset..]` into `dst`.
    ///
    /// # Errors
    /// Returns `RamOutOfBounds` if the range leaves the region.
    pub fn read(&self, region: &RamRegion, offset: usize, dst: &mut [u8]) -> Result<()> {
        let start = region_span(region, offset, dst.len())?;
        self.read_at(start, dst)
    }

    /// Blocking copy of `src` into `region[offset..]`.
    ///
    /// # Errors
    /// Returns `RamOutOfBounds` if the range leaves the region.
    pub fn write(&self, region: &RamRegion, offset: usize, src: &[u8]) -> Result<()> {
        let start = region_span(region, offset, src.len())?;
        self.write_at(start, src)
    }

    /// Blocking read at a raw device address.
    ///
    /// # Errors
    /// Returns `RamOutOfBounds` if the range leaves the device.
    pub fn read_at(&self, addr: usize, dst: &mut [u8]) -> Result<()> {
        let inner = self.lock()?;
        let range = self.span(addr, dst.len())?;
        dst.copy_from_slice(&inner.mem[range]);
        Ok(())
    }

    /// Blocking write at a raw device address.
    ///
    /// # Errors
    /// Returns `RamOutOfBounds` if the range leaves the device.
    pub fn write_at(&self, addr: usize, src: &[u8]) -> Result<()> {
        let mut inner = self.lock()?;
        let range = self.span(addr, src.len())?;
        inner.mem[range].copy_from_slice(src);
        Ok(())
    }

    /// Power the device down. Later accesses fail with `RamClosed`.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.open {
                inner.open = false;
                inner.mem = Vec::new();
                info!("external RAM closed");
            }
        }
    }

    /// Whether `close` has not been called yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.lock().is_ok_and(|inner| inner.open)
    }

    fn span(&self, addr: usize, len: usize) -> Result<std::ops::Range<usize>> {
        match addr.checked_add(len) {
            Some(end) if end <= self.size => Ok(addr..end),
            _ => Err(OffloadError::RamOutOfBounds {
                offset: addr,
                len,
                limit: self.size,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RamInner>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| OffloadError::ram_fault("device lock poisoned"))?;
        if !inner.open {
            return Err(OffloadError::RamClosed);
        }
        Ok(inner)
    }
}

impl core::fmt::Debug for RamDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RamDevice")
            .field("size", &self.size)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Absolute start address of `len` bytes at `offset` inside `region`.
fn region_span(region: &RamRegion, offset: usize, len: usize) -> Result<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= region.len => (region.addr as usize)
            .checked_add(offset)
            .ok_or_else(|| OffloadError::ram_fault("region address overflows")),
        _ => Err(OffloadError::RamOutOfBounds {
            offset,
            len,
            limit: region.len,
        }),
    }
}

// =============================================================================
// DMA WINDOW
// =============================================================================

/// One region of external RAM exposed to a DMA channel.
#[derive(Debug, Clone, Copy)]
pub struct RamWindow<'a> {
    ram: &'a RamDevice,
    region: RamRegion,
}

impl<'a> RamWindow<'a> {
    /// Window over `region` of `ram`.
    #[must_use]
    pub const fn new(ram: &'a RamDevice, region: RamRegion) -> Self {
        Self { ram, region }
    }
}

impl Memory for RamWindow<'_> {
    fn size(&self) -> usize {
        self.region.len
    }

    fn read_into(&mut self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.ram.read(&self.region, offset, dst)
    }

    fn write_from(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        self.ram.write(&self.region, offset, src)
    }
}
