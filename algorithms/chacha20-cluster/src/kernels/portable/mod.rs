//! Portable implementation of ChaCha20.
//!
//! Scalar, allocation-free keystream generation. Used both as the serial
//! reference encoder and as the per-core block kernel of the cluster.

mod state;

pub use self::state::ChaChaState;

use crate::kernels::constants::BLOCK_SIZE;

// =============================================================================
// BLOCK KERNEL
// =============================================================================

/// XOR one slab (at most 64 bytes) with the keystream block for `counter`.
///
/// A short slab consumes only the prefix of the generated block.
#[inline]
pub fn xor_block(state: &ChaChaState, counter: u32, slab: &mut [u8]) {
    debug_assert!(slab.len() <= BLOCK_SIZE);
    let block = state.keystream_block(counter);
    for (byte, ks) in slab.iter_mut().zip(block.iter()) {
        *byte ^= ks;
    }
}

// =============================================================================
// SERIAL STREAM
// =============================================================================

/// XOR `data` with the keystream starting at block `counter`.
///
/// Callers check the stream length; the counter wraps silently here.
pub fn xor_keystream(state: &ChaChaState, counter: u32, data: &mut [u8]) {
    let mut ctr = counter;
    for slab in data.chunks_mut(BLOCK_SIZE) {
        xor_block(state, ctr, slab);
        ctr = ctr.wrapping_add(1);
    }
}
