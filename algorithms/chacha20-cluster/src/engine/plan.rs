//! Tile Plan
//!
//! Splits `[0, len)` into tile-sized pieces and assigns each its block-counter
//! base. Tiles are disjoint, ordered by offset, and cover the buffer exactly.

use crate::error::{OffloadError, Result};
use crate::kernels::constants::{BLOCK_SHIFT, BLOCK_SIZE, MAX_STREAM_LEN};

/// One unit of pipeline work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDescriptor {
    /// Position in the plan.
    pub index: usize,
    /// Byte offset of the tile in the plaintext.
    pub offset: usize,
    /// Tile length; only the last tile may be shorter than the tile size.
    pub len: usize,
    /// Block counter of the tile's first 64-byte block.
    pub counter_base: u32,
}

impl TileDescriptor {
    /// Number of keystream blocks the tile consumes.
    #[must_use]
    pub const fn blocks(&self) -> usize {
        self.len.div_ceil(BLOCK_SIZE)
    }
}

/// Tiling of one encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    len: usize,
    tile_size: usize,
    initial_counter: u32,
}

impl TilePlan {
    /// Plan `len` bytes in tiles of `tile_size`, starting at block `initial_counter`.
    ///
    /// # Errors
    /// `CounterOverflow` if the stream would need a block counter past
    /// `u32::MAX`; `InvalidConfig` if the tile size is not a positive multiple
    /// of the block size.
    pub fn new(len: usize, tile_size: usize, initial_counter: u32) -> Result<Self> {
        if tile_size == 0 || tile_size % BLOCK_SIZE != 0 {
            return Err(OffloadError::invalid_config(format!(
                "tile size {tile_size} is not a multiple of {BLOCK_SIZE}"
            )));
        }
        let blocks = (len as u64).div_ceil(BLOCK_SIZE as u64);
        let last_block = u64::from(initial_counter) + blocks;
        if len as u64 > MAX_STREAM_LEN || last_block > MAX_STREAM_LEN >> BLOCK_SHIFT {
            return Err(OffloadError::CounterOverflow {
                len: len as u64,
                counter: initial_counter,
            });
        }
        Ok(Self {
            len,
            tile_size,
            initial_counter,
        })
    }

    /// Plaintext length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Nothing to encrypt.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of tiles.
    #[must_use]
    pub const fn tile_count(&self) -> usize {
        self.len.div_ceil(self.tile_size)
    }

    /// Descriptor of tile `index`, if it exists.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tile(&self, index: usize) -> Option<TileDescriptor> {
        if index >= self.tile_count() {
            return None;
        }
        let offset = index * self.tile_size;
        let len = self.tile_size.min(self.len - offset);
        // bounded by the overflow check in `new`
        let counter_base = self.initial_counter + (offset >> BLOCK_SHIFT) as u32;
        Some(TileDescriptor {
            index,
            offset,
            len,
            counter_base,
        })
    }

    /// Tiles in offset order.
    pub fn iter(&self) -> impl Iterator<Item = TileDescriptor> + '_ {
        (0..self.tile_count()).filter_map(|i| self.tile(i))
    }
}
