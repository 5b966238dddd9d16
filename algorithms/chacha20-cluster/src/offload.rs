//! Offload API
//!
//! Entry points the benchmark drivers call: cluster lifecycle, the two
//! cluster encryptors, and the two serial reference encoders.

use crate::context::ClusterHandle;
use crate::error::{OffloadError, Result};
use crate::kernels::constants::BLOCK_SIZE;
use crate::kernels::portable::{self, ChaChaState};
use crate::platform::cluster::ClusterConf;
use crate::platform::ram::{RamDevice, RamRegion};
use crate::types::CipherParams;

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::ChaCha20;

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Open the cluster and allocate its L1 working set.
///
/// # Errors
/// See [`ClusterHandle::init`].
pub fn cluster_init(conf: &ClusterConf) -> Result<ClusterHandle> {
    ClusterHandle::init(conf)
}

/// Release the handle's L1 allocations and power the cluster down.
pub fn cluster_close(handle: ClusterHandle) {
    handle.close();
}

// =============================================================================
// CLUSTER ENCRYPTION
// =============================================================================

/// Encrypt an L2-resident buffer in place on the cluster.
///
/// # Errors
/// `CounterOverflow` for oversized inputs, DMA faults from the task.
pub fn chacha20_encrypt(
    data: &mut [u8],
    params: &CipherParams,
    handle: &mut ClusterHandle,
) -> Result<()> {
    handle.encrypt_l2(data, params)
}

/// Encrypt the first `len` bytes of an external RAM region in place.
///
/// # Errors
/// `RamOutOfBounds` if `len` exceeds the region, RAM and DMA faults from
/// the task.
pub fn chacha20_encrypt_ram(
    region: &RamRegion,
    len: usize,
    params: &CipherParams,
    handle: &mut ClusterHandle,
    ram: &RamDevice,
) -> Result<()> {
    handle.encrypt_ram(ram, region, len, params)
}

// =============================================================================
// REFERENCE ENCODERS
// =============================================================================

/// Serial reference: this crate's portable kernel on the calling thread.
///
/// # Errors
/// `CounterOverflow` if the stream would wrap the block counter.
pub fn encrypt_serial(data: &mut [u8], params: &CipherParams) -> Result<()> {
    params.check_len(data.len())?;
    let state = ChaChaState::new(&params.key, &params.nonce, params.counter);
    portable::xor_keystream(&state, params.counter, data);
    Ok(())
}

/// Serial reference: the RustCrypto `chacha20` cipher, unmodified.
///
/// # Errors
/// `CounterOverflow` if the stream would wrap the block counter.
pub fn encrypt_serial_orig(data: &mut [u8], params: &CipherParams) -> Result<()> {
    params.check_len(data.len())?;
    let len = data.len() as u64;
    let overflow = || OffloadError::CounterOverflow {
        len,
        counter: params.counter,
    };

    let mut cipher = ChaCha20::new(&params.key.into(), &params.nonce.into());
    cipher
        .try_seek(u64::from(params.counter) * BLOCK_SIZE as u64)
        .map_err(|_| overflow())?;
    cipher.try_apply_keystream(data).map_err(|_| overflow())
}
