//! L1 Scratchpad
//!
//! Budgeted bump allocator for the cluster's tightly-coupled memory, and the
//! owned tile buffers that move between the compute stage and the DMA
//! channels.

use crate::error::{OffloadError, Result};
use tracing::trace;

/// Allocation granularity (one 32-bit word).
const L1_ALIGN: usize = 4;

// =============================================================================
// SCRATCHPAD
// =============================================================================

/// Bump allocator over a fixed L1 budget.
///
/// Allocations live as long as the cluster context; there is no per-item free.
#[derive(Debug, Clone)]
pub struct L1Scratch {
    budget: usize,
    used: usize,
}

impl L1Scratch {
    /// Empty scratchpad of `budget` bytes.
    #[must_use]
    pub const fn new(budget: usize) -> Self {
        Self { budget, used: 0 }
    }

    /// Reserve `len` bytes (rounded up to a word) and return their offset.
    ///
    /// # Errors
    /// Returns `L1Exhausted` if the remaining budget is too small.
    pub fn alloc(&mut self, len: usize, what: &'static str) -> Result<usize> {
        let requested = len.next_multiple_of(L1_ALIGN);
        let available = self.remaining();
        if requested > available {
            return Err(OffloadError::L1Exhausted {
                what,
                requested,
                available,
                budget: self.budget,
            });
        }
        let offset = self.used;
        self.used += requested;
        trace!(what, offset, requested, "l1 alloc");
        Ok(offset)
    }

    /// Reserve one tile buffer.
    ///
    /// # Errors
    /// Returns `L1Exhausted` if the tile does not fit.
    pub fn alloc_tile(&mut self, size: usize) -> Result<TileBuf> {
        let offset = self.alloc(size, "tile buffer")?;
        Ok(TileBuf::new(offset, size))
    }

    /// Bytes allocated so far.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Bytes still free.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.budget - self.used
    }

    /// Total budget.
    #[must_use]
    pub const fn budget(&self) -> usize {
        self.budget
    }
}

// =============================================================================
// TILE BUFFER
// =============================================================================

/// One tile-sized buffer (L1 work slot or L2 staging slot).
///
/// Ownership is the synchronization: whoever holds the value may touch the
/// bytes, and handing it to a DMA channel gives it up until completion.
#[derive(Debug)]
pub struct TileBuf {
    addr: usize,
    data: Box<[u8]>,
}

impl TileBuf {
    /// Zeroed buffer of `size` bytes tagged with its scratchpad address.
    #[must_use]
    pub fn new(addr: usize, size: usize) -> Self {
        Self {
            addr,
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Scratchpad address this buffer models.
    #[must_use]
    pub const fn addr(&self) -> usize {
        self.addr
    }

    /// Capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Read view.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Write view.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
