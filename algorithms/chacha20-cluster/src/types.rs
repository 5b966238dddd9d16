//! Shared types used across the library.

use crate::error::{OffloadError, Result};
use crate::kernels::constants::{BLOCK_SIZE, KEY_SIZE, MAX_STREAM_LEN, NONCE_SIZE};
use subtle::ConstantTimeEq;

// =============================================================================
// KEY MATERIAL
// =============================================================================

/// 256-bit ChaCha20 key.
pub type Key = [u8; KEY_SIZE];

/// 96-bit IETF nonce.
pub type Nonce = [u8; NONCE_SIZE];

/// Cipher parameters for one encryption.
///
/// (key, nonce, counter) must never repeat across two different plaintexts.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CipherParams {
    /// Secret key.
    pub key: Key,
    /// Nonce.
    pub nonce: Nonce,
    /// Initial block counter.
    pub counter: u32,
}

impl CipherParams {
    /// Parameters starting at block 0.
    #[must_use]
    pub const fn new(key: Key, nonce: Nonce) -> Self {
        Self {
            key,
            nonce,
            counter: 0,
        }
    }

    /// Same key and nonce, different initial counter.
    #[must_use]
    pub const fn with_counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }

    /// Constant-time equality (the key is secret).
    #[must_use]
    pub fn ct_matches(&self, other: &Self) -> bool {
        let same = self.key.ct_eq(&other.key)
            & self.nonce.ct_eq(&other.nonce)
            & self.counter.ct_eq(&other.counter);
        same.into()
    }

    /// Fail if `len` bytes starting at this counter would wrap the block counter.
    ///
    /// # Errors
    /// Returns `CounterOverflow` if more than `2^32 - counter` blocks are needed.
    pub fn check_len(&self, len: usize) -> Result<()> {
        let len = len as u64;
        let blocks = len.div_ceil(BLOCK_SIZE as u64);
        let remaining = (MAX_STREAM_LEN / BLOCK_SIZE as u64) - u64::from(self.counter);
        if len > MAX_STREAM_LEN || blocks > remaining {
            return Err(OffloadError::CounterOverflow {
                len,
                counter: self.counter,
            });
        }
        Ok(())
    }
}

impl core::fmt::Debug for CipherParams {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CipherParams")
            .field("key", &"<redacted>")
            .field("nonce", &self.nonce)
            .field("counter", &self.counter)
            .finish()
    }
}
