//! C-API Bindings
//!
//! Exposes the offload API to C drivers with pointer checks and panic
//! boundaries. Handles are opaque boxes owned by the caller until the
//! matching close call.

#![allow(unsafe_code)]

use crate::kernels::constants::{KEY_SIZE, NONCE_SIZE};
use crate::offload;
use crate::platform::cluster::ClusterConf;
use crate::platform::ram::{RamConf, RamDevice, RamRegion};
use crate::types::CipherParams;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::slice;

/// Returned by `ram_alloc` when no region could be allocated.
pub const RAM_ALLOC_FAILED: u32 = u32::MAX;

// =============================================================================
// HANDLES
// =============================================================================

/// Opaque cluster handle for C.
pub struct ClusterHandlePtr(crate::context::ClusterHandle);

/// Opaque external RAM device for C.
pub struct RamDevicePtr(RamDevice);

/// Map an offload result (or a caught panic) to a C status code.
fn status(result: std::thread::Result<crate::error::Result<()>>) -> i32 {
    match result {
        Ok(Ok(())) => 0,
        Ok(Err(_)) | Err(_) => -2,
    }
}

/// Copy key and nonce out of caller memory.
///
/// # Safety
/// `key_ptr` must point to 32 bytes and `nonce_ptr` to 12 bytes.
unsafe fn read_params(key_ptr: *const u8, nonce_ptr: *const u8) -> CipherParams {
    let mut key = [0u8; KEY_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    key.copy_from_slice(slice::from_raw_parts(key_ptr, KEY_SIZE));
    nonce.copy_from_slice(slice::from_raw_parts(nonce_ptr, NONCE_SIZE));
    CipherParams::new(key, nonce)
}

// =============================================================================
// CLUSTER LIFECYCLE
// =============================================================================

/// Open the cluster with `cores` workers (0 = default) and allocate its L1
/// working set. Returns NULL on failure.
/// Caller must release with `cluster_close`.
#[no_mangle]
pub unsafe extern "C" fn cluster_init(cores: usize) -> *mut ClusterHandlePtr {
    let defaults = ClusterConf::default();
    let conf = ClusterConf {
        cores: if cores == 0 { defaults.cores } else { cores },
        ..defaults
    };
    match catch_unwind(|| offload::cluster_init(&conf)) {
        Ok(Ok(handle)) => Box::into_raw(Box::new(ClusterHandlePtr(handle))),
        _ => std::ptr::null_mut(),
    }
}

/// Release the cluster.
///
/// # Safety
/// - `handle` must come from `cluster_init` and not be used afterwards, or be null
#[no_mangle]
pub unsafe extern "C" fn cluster_close(handle: *mut ClusterHandlePtr) {
    if !handle.is_null() {
        let boxed = Box::from_raw(handle);
        offload::cluster_close(boxed.0);
    }
}

// =============================================================================
// ENCRYPTION
// =============================================================================

/// Encrypt an L2 buffer in place on the cluster.
///
/// # Safety
/// - `data_ptr` must be valid for `len` writable bytes
/// - `key_ptr` must point to 32 bytes, `nonce_ptr` to 12 bytes
/// - `handle` must come from `cluster_init`
///
/// # Returns
/// - `0`: Success
/// - `-1`: Null pointer
/// - `-2`: Failure or panic
#[no_mangle]
pub unsafe extern "C" fn chacha20_encrypt(
    data_ptr: *mut u8,
    len: usize,
    key_ptr: *const u8,
    nonce_ptr: *const u8,
    handle: *mut ClusterHandlePtr,
) -> i32 {
    if data_ptr.is_null() || key_ptr.is_null() || nonce_ptr.is_null() || handle.is_null() {
        return -1;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let data = slice::from_raw_parts_mut(data_ptr, len);
        let params = read_params(key_ptr, nonce_ptr);
        offload::chacha20_encrypt(data, &params, &mut (*handle).0)
    }));
    status(result)
}

/// Encrypt `len` bytes of external RAM at `addr` in place on the cluster.
///
/// # Safety
/// - `key_ptr` must point to 32 bytes, `nonce_ptr` to 12 bytes
/// - `handle` must come from `cluster_init`, `ram` from `ram_open`
///
/// # Returns
/// - `0`: Success
/// - `-1`: Null pointer (including a NULL cluster handle)
/// - `-2`: Failure or panic
#[no_mangle]
pub unsafe extern "C" fn chacha20_encrypt_ram(
    addr: u32,
    len: usize,
    key_ptr: *const u8,
    nonce_ptr: *const u8,
    handle: *mut ClusterHandlePtr,
    ram: *const RamDevicePtr,
) -> i32 {
    if key_ptr.is_null() || nonce_ptr.is_null() || handle.is_null() || ram.is_null() {
        return -1;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let params = read_params(key_ptr, nonce_ptr);
        let region = RamRegion::from_raw(addr, len);
        offload::chacha20_encrypt_ram(&region, len, &params, &mut (*handle).0, &(*ram).0)
    }));
    status(result)
}

/// Serial reference encoder (portable kernel).
///
/// # Safety
/// - `data_ptr` must be valid for `len` writable bytes
/// - `key_ptr` must point to 32 bytes, `nonce_ptr` to 12 bytes
///
/// # Returns
/// - `0`: Success
/// - `-1`: Null pointer
/// - `-2`: Failure or panic
#[no_mangle]
pub unsafe extern "C" fn encrypt_serial(
    data_ptr: *mut u8,
    len: usize,
    key_ptr: *const u8,
    nonce_ptr: *const u8,
) -> i32 {
    if data_ptr.is_null() || key_ptr.is_null() || nonce_ptr.is_null() {
        return -1;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let data = slice::from_raw_parts_mut(data_ptr, len);
        offload::encrypt_serial(data, &read_params(key_ptr, nonce_ptr))
    }));
    status(result)
}

/// Serial reference encoder (RustCrypto `chacha20`).
///
/// # Safety
/// - `data_ptr` must be valid for `len` writable bytes
/// - `key_ptr` must point to 32 bytes, `nonce_ptr` to 12 bytes
///
/// # Returns
/// - `0`: Success
/// - `-1`: Null pointer
/// - `-2`: Failure or panic
#[no_mangle]
pub unsafe extern "C" fn encrypt_serial_orig(
    data_ptr: *mut u8,
    len: usize,
    key_ptr: *const u8,
    nonce_ptr: *const u8,
) -> i32 {
    if data_ptr.is_null() || key_ptr.is_null() || nonce_ptr.is_null() {
        return -1;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let data = slice::from_raw_parts_mut(data_ptr, len);
        offload::encrypt_serial_orig(data, &read_params(key_ptr, nonce_ptr))
    }));
    status(result)
}

// =============================================================================
// EXTERNAL RAM
// =============================================================================

/// Open an external RAM device of `size` bytes (0 = default). Returns NULL on failure.
/// Caller must release with `ram_close`.
#[no_mangle]
pub unsafe extern "C" fn ram_open(size: usize) -> *mut RamDevicePtr {
    let conf = if size == 0 {
        RamConf::default()
    } else {
        RamConf { size }
    };
    match catch_unwind(|| RamDevice::open(&conf)) {
        Ok(Ok(ram)) => Box::into_raw(Box::new(RamDevicePtr(ram))),
        _ => std::ptr::null_mut(),
    }
}

/// Allocate `len` bytes. Returns the device address, or `RAM_ALLOC_FAILED`.
///
/// # Safety
/// - `ram` must come from `ram_open`
#[no_mangle]
pub unsafe extern "C" fn ram_alloc(ram: *const RamDevicePtr, len: usize) -> u32 {
    if ram.is_null() {
        return RAM_ALLOC_FAILED;
    }
    match catch_unwind(AssertUnwindSafe(|| (*ram).0.alloc(len))) {
        Ok(Ok(region)) => region.addr(),
        _ => RAM_ALLOC_FAILED,
    }
}

/// Blocking read of `len` bytes at device address `addr`.
///
/// # Safety
/// - `ram` must come from `ram_open`
/// - `dst_ptr` must be valid for `len` writable bytes
///
/// # Returns
/// - `0`: Success
/// - `-1`: Null pointer
/// - `-2`: Failure or panic
#[no_mangle]
pub unsafe extern "C" fn ram_read(
    ram: *const RamDevicePtr,
    addr: u32,
    dst_ptr: *mut u8,
    len: usize,
) -> i32 {
    if ram.is_null() || dst_ptr.is_null() {
        return -1;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let dst = slice::from_raw_parts_mut(dst_ptr, len);
        (*ram).0.read_at(addr as usize, dst)
    }));
    status(result)
}

/// Blocking write of `len` bytes to device address `addr`.
///
/// # Safety
/// - `ram` must come from `ram_open`
/// - `src_ptr` must be valid for `len` bytes
///
/// # Returns
/// - `0`: Success
/// - `-1`: Null pointer
/// - `-2`: Failure or panic
#[no_mangle]
pub unsafe extern "C" fn ram_write(
    ram: *const RamDevicePtr,
    addr: u32,
    src_ptr: *const u8,
    len: usize,
) -> i32 {
    if ram.is_null() || src_ptr.is_null() {
        return -1;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let src = slice::from_raw_parts(src_ptr, len);
        (*ram).0.write_at(addr as usize, src)
    }));
    status(result)
}

/// Power the device down and free it.
///
/// # Safety
/// - `ram` must come from `ram_open` and not be used afterwards, or be null
#[no_mangle]
pub unsafe extern "C" fn ram_close(ram: *mut RamDevicePtr) {
    if !ram.is_null() {
        let boxed = Box::from_raw(ram);
        boxed.0.close();
    }
}
