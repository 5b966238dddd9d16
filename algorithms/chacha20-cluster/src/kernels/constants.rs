//! ChaCha20 Kernel Constants
//!
//! Parameters of the IETF variant (RFC 7539 / RFC 8439): 256-bit key,
//! 96-bit nonce, 32-bit little-endian block counter.

// =============================================================================
// STATE LAYOUT
// =============================================================================

/// `"expand 32-byte k"` as little-endian words.
pub const SIGMA: [u32; 4] = [
    0x6170_7865, // "expa"
    0x3320_646e, // "nd 3"
    0x7962_2d32, // "2-by"
    0x6b20_6574, // "te k"
];

/// Words in the ChaCha state matrix.
pub const STATE_WORDS: usize = 16;

/// Index of the block counter word.
pub const COUNTER_WORD: usize = 12;

// =============================================================================
// SIZES
// =============================================================================

/// Key length in bytes.
pub const KEY_SIZE: usize = 32;

/// Nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// Keystream bytes produced per counter value.
pub const BLOCK_SIZE: usize = 64;

/// log2(`BLOCK_SIZE`), used to turn byte offsets into counter offsets.
pub const BLOCK_SHIFT: u32 = 6;

/// 10 double rounds (column + diagonal) = 20 rounds.
pub const DOUBLE_ROUNDS: usize = 10;

/// Longest keystream a single (key, nonce) can produce: 2^32 blocks (256 GiB).
pub const MAX_STREAM_LEN: u64 = (1u64 << 32) * BLOCK_SIZE as u64;
