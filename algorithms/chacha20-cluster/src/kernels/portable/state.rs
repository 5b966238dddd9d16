//! ChaCha20 State Header & Block Function
//!
//! The initial state matrix (constants ∥ key ∥ counter ∥ nonce) is expanded once
//! per (key, nonce) and shared read-only by every core; each block only swaps
//! in its own counter word.

use crate::kernels::constants::{
    BLOCK_SIZE, COUNTER_WORD, DOUBLE_ROUNDS, KEY_SIZE, NONCE_SIZE, SIGMA, STATE_WORDS,
};

// =============================================================================
// STATE HEADER
// =============================================================================

/// Expanded initial ChaCha20 state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChaChaState {
    words: [u32; STATE_WORDS],
}

impl ChaChaState {
    /// Expand `key` and `nonce` into the state matrix with block counter `counter`.
    #[must_use]
    pub fn new(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], counter: u32) -> Self {
        let mut words = [0u32; STATE_WORDS];
        words[..4].copy_from_slice(&SIGMA);
        for (word, chunk) in words[4..12].iter_mut().zip(key.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words[COUNTER_WORD] = counter;
        for (word, chunk) in words[13..].iter_mut().zip(nonce.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { words }
    }

    /// Raw state words.
    #[must_use]
    pub const fn words(&self) -> &[u32; STATE_WORDS] {
        &self.words
    }

    /// Block counter stored in the header.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.words[COUNTER_WORD]
    }

    /// Produce the 64-byte keystream block for `counter`.
    ///
    /// The header's own counter word is ignored; it is not advanced.
    #[must_use]
    pub fn keystream_block(&self, counter: u32) -> [u8; BLOCK_SIZE] {
        let mut input = self.words;
        input[COUNTER_WORD] = counter;
        let output = run_rounds(&input);

        let mut block = [0u8; BLOCK_SIZE];
        for (chunk, word) in block.chunks_exact_mut(4).zip(output.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        block
    }
}

// =============================================================================
// PERMUTATION
// =============================================================================

/// 20 rounds followed by the feed-forward addition of the input.
#[inline]
fn run_rounds(input: &[u32; STATE_WORDS]) -> [u32; STATE_WORDS] {
    let mut x = *input;

    for _ in 0..DOUBLE_ROUNDS {
        // column rounds
        quarter_round(&mut x, 0, 4, 8, 12);
        quarter_round(&mut x, 1, 5, 9, 13);
        quarter_round(&mut x, 2, 6, 10, 14);
        quarter_round(&mut x, 3, 7, 11, 15);

        // diagonal rounds
        quarter_round(&mut x, 0, 5, 10, 15);
        quarter_round(&mut x, 1, 6, 11, 12);
        quarter_round(&mut x, 2, 7, 8, 13);
        quarter_round(&mut x, 3, 4, 9, 14);
    }

    for (out, word) in x.iter_mut().zip(input.iter()) {
        *out = out.wrapping_add(*word);
    }
    x
}

#[inline(always)]
#[allow(clippy::inline_always)]
fn quarter_round(x: &mut [u32; STATE_WORDS], a: usize, b: usize, c: usize, d: usize) {
    x[a] = x[a].wrapping_add(x[b]);
    x[d] = (x[d] ^ x[a]).rotate_left(16);

    x[c] = x[c].wrapping_add(x[d]);
    x[b] = (x[b] ^ x[c]).rotate_left(12);

    x[a] = x[a].wrapping_add(x[b]);
    x[d] = (x[d] ^ x[a]).rotate_left(8);

    x[c] = x[c].wrapping_add(x[d]);
    x[b] = (x[b] ^ x[c]).rotate_left(7);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_round_rfc_2_1_1() {
        // RFC 7539 §2.1.1, placed in lanes (0, 1, 2, 3)
        let mut x = [0u32; STATE_WORDS];
        x[0] = 0x1111_1111;
        x[1] = 0x0102_0304;
        x[2] = 0x9b8d_6f43;
        x[3] = 0x0123_4567;
        quarter_round(&mut x, 0, 1, 2, 3);
        assert_eq!(x[0], 0xea2a_92f4);
        assert_eq!(x[1], 0xcb1c_f8ce);
        assert_eq!(x[2], 0x4581_472e);
        assert_eq!(x[3], 0x5881_c4bb);
    }

    #[test]
    fn header_layout() {
        let key: [u8; KEY_SIZE] = core::array::from_fn(|i| i as u8);
        let nonce = [0, 0, 0, 0x09, 0, 0, 0, 0x4a, 0, 0, 0, 0];
        let state = ChaChaState::new(&key, &nonce, 1);
        let w = state.words();

        assert_eq!(&w[..4], &SIGMA);
        assert_eq!(w[4], 0x0302_0100);
        assert_eq!(w[11], 0x1f1e_1d1c);
        assert_eq!(w[12], 1);
        assert_eq!(w[13], 0x0900_0000);
        assert_eq!(w[14], 0x4a00_0000);
        assert_eq!(w[15], 0);
    }

    #[test]
    fn zero_key_first_block() {
        let state = ChaChaState::new(&[0; KEY_SIZE], &[0; NONCE_SIZE], 0);
        let block = state.keystream_block(0);
        assert_eq!(&block[..8], &[0x76, 0xb8, 0xe0, 0xad, 0xa0, 0xf1, 0x3d, 0x90]);
        assert_eq!(&block[56..], &[0xc3, 0x87, 0xb6, 0x69, 0xb2, 0xee, 0x65, 0x86]);
    }
}
