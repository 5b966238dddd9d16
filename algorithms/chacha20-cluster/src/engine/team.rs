//! Compute Stage
//!
//! Block-parallel keystream XOR over one L1 tile. Slab `j` of the tile goes to
//! worker `j % cores` and uses counter `counter_base + j`. The fork-join of
//! the worker scope is the cluster barrier: the master does not touch the
//! tile again until every worker has returned.

use crate::kernels::constants::BLOCK_SIZE;
use crate::kernels::portable::{xor_block, ChaChaState};

/// Work slot descriptor of one core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreSlot {
    /// Keystream blocks generated.
    pub blocks: u64,
    /// Bytes XORed (short final slabs count their used prefix only).
    pub bytes: u64,
}

/// The worker cores of a cluster, with one slot each.
#[derive(Debug, Clone)]
pub struct Team {
    slots: Vec<CoreSlot>,
    barriers: u64,
}

impl Team {
    /// Team of `cores` workers with zeroed slots.
    #[must_use]
    pub fn new(cores: usize) -> Self {
        Self {
            slots: vec![CoreSlot::default(); cores.max(1)],
            barriers: 0,
        }
    }

    /// Number of workers.
    #[must_use]
    pub fn cores(&self) -> usize {
        self.slots.len()
    }

    /// Per-core slots.
    #[must_use]
    pub fn slots(&self) -> &[CoreSlot] {
        &self.slots
    }

    /// Barriers crossed since the last reset.
    #[must_use]
    pub const fn barriers(&self) -> u64 {
        self.barriers
    }

    /// Zero every slot and the barrier count.
    pub fn reset(&mut self) {
        self.slots.fill(CoreSlot::default());
        self.barriers = 0;
    }

    /// XOR `tile` in place with the keystream starting at `counter_base`.
    ///
    /// Returns once every worker has finished.
    #[allow(clippy::cast_possible_truncation)]
    pub fn xor_tile(&mut self, state: &ChaChaState, counter_base: u32, tile: &mut [u8]) {
        let cores = self.slots.len();
        let mut lanes: Vec<Vec<(u32, &mut [u8])>> = (0..cores)
            .map(|_| Vec::with_capacity(tile.len().div_ceil(BLOCK_SIZE * cores)))
            .collect();
        for (j, slab) in tile.chunks_mut(BLOCK_SIZE).enumerate() {
            // tiles never cross the counter limit
            lanes[j % cores].push((counter_base.wrapping_add(j as u32), slab));
        }

        #[cfg(feature = "multithread")]
        rayon::scope(|s| {
            for (lane, slot) in lanes.into_iter().zip(self.slots.iter_mut()) {
                s.spawn(move |_| run_lane(state, lane, slot));
            }
        });
        #[cfg(not(feature = "multithread"))]
        for (lane, slot) in lanes.into_iter().zip(self.slots.iter_mut()) {
            run_lane(state, lane, slot);
        }

        self.barriers += 1;
    }
}

/// One worker's share of a tile.
fn run_lane(state: &ChaChaState, lane: Vec<(u32, &mut [u8])>, slot: &mut CoreSlot) {
    for (counter, slab) in lane {
        xor_block(state, counter, slab);
        slot.blocks += 1;
        slot.bytes += slab.len() as u64;
    }
}
