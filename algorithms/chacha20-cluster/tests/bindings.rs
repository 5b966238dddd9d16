//! Language Binding Tests
//!
//! Exercises the C API in-process (status codes, null handling, ownership)
//! and end-to-end through a C driver linked against the release `cdylib`.

#![allow(unsafe_code)]
#![allow(clippy::pedantic, clippy::nursery)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chacha20_cluster::ffi;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::ptr;
use std::sync::Once;

const KEY: [u8; 32] = [0; 32];
const NONCE: [u8; 12] = [0; 12];

// =============================================================================
// IN-PROCESS C API
// =============================================================================

#[test]
fn test_ffi_round_trip() {
    unsafe {
        let handle = ffi::cluster_init(4);
        assert!(!handle.is_null());

        let mut cluster = vec![0u8; 5000];
        let mut serial = vec![0u8; 5000];
        let mut orig = vec![0u8; 5000];
        assert_eq!(
            ffi::chacha20_encrypt(cluster.as_mut_ptr(), 5000, KEY.as_ptr(), NONCE.as_ptr(), handle),
            0
        );
        assert_eq!(
            ffi::encrypt_serial(serial.as_mut_ptr(), 5000, KEY.as_ptr(), NONCE.as_ptr()),
            0
        );
        assert_eq!(
            ffi::encrypt_serial_orig(orig.as_mut_ptr(), 5000, KEY.as_ptr(), NONCE.as_ptr()),
            0
        );
        assert_eq!(cluster, serial);
        assert_eq!(cluster, orig);
        assert_eq!(cluster[0], 0x76);

        ffi::cluster_close(handle);
    }
}

#[test]
fn test_ffi_ram_round_trip() {
    unsafe {
        let handle = ffi::cluster_init(0);
        let ram = ffi::ram_open(64 * 1024);
        assert!(!handle.is_null());
        assert!(!ram.is_null());

        let addr = ffi::ram_alloc(ram, 3000);
        assert_ne!(addr, ffi::RAM_ALLOC_FAILED);

        let zeros = vec![0u8; 3000];
        assert_eq!(ffi::ram_write(ram, addr, zeros.as_ptr(), 3000), 0);
        assert_eq!(
            ffi::chacha20_encrypt_ram(addr, 3000, KEY.as_ptr(), NONCE.as_ptr(), handle, ram),
            0
        );
        let mut back = vec![0u8; 3000];
        assert_eq!(ffi::ram_read(ram, addr, back.as_mut_ptr(), 3000), 0);

        let mut serial = vec![0u8; 3000];
        ffi::encrypt_serial(serial.as_mut_ptr(), 3000, KEY.as_ptr(), NONCE.as_ptr());
        assert_eq!(back, serial);

        ffi::ram_close(ram);
        ffi::cluster_close(handle);
    }
}

#[test]
fn test_ffi_null_pointers() {
    unsafe {
        let mut data = [0u8; 16];
        assert_eq!(
            ffi::chacha20_encrypt(data.as_mut_ptr(), 16, KEY.as_ptr(), NONCE.as_ptr(), ptr::null_mut()),
            -1
        );
        assert_eq!(
            ffi::encrypt_serial(ptr::null_mut(), 16, KEY.as_ptr(), NONCE.as_ptr()),
            -1
        );
        assert_eq!(
            ffi::encrypt_serial_orig(data.as_mut_ptr(), 16, ptr::null(), NONCE.as_ptr()),
            -1
        );

        // A missing cluster handle on the RAM path is a null-pointer error.
        let ram = ffi::ram_open(0);
        assert_eq!(
            ffi::chacha20_encrypt_ram(0, 16, KEY.as_ptr(), NONCE.as_ptr(), ptr::null_mut(), ram),
            -1
        );
        assert_eq!(ffi::ram_alloc(ptr::null(), 16), ffi::RAM_ALLOC_FAILED);
        assert_eq!(ffi::ram_read(ram, 0, ptr::null_mut(), 16), -1);
        ffi::ram_close(ram);

        ffi::cluster_close(ptr::null_mut());
        ffi::ram_close(ptr::null_mut());
    }
}

#[test]
fn test_ffi_failures() {
    unsafe {
        assert!(ffi::cluster_init(3).is_null());
        assert!(ffi::ram_open(usize::MAX).is_null());

        let ram = ffi::ram_open(1024);
        assert_eq!(ffi::ram_alloc(ram, 4096), ffi::RAM_ALLOC_FAILED);
        let mut buf = [0u8; 16];
        assert_eq!(ffi::ram_read(ram, 1020, buf.as_mut_ptr(), 16), -2);

        let handle = ffi::cluster_init(1);
        // region of 16 bytes past the end of the device
        assert_eq!(
            ffi::chacha20_encrypt_ram(1020, 16, KEY.as_ptr(), NONCE.as_ptr(), handle, ram),
            -2
        );
        ffi::cluster_close(handle);
        ffi::ram_close(ram);
    }
}

// =============================================================================
// C DRIVER
// =============================================================================

/// Ensures `cargo build --release` runs only once across all tests.
static BUILD_ONCE: Once = Once::new();

fn ensure_release_build() {
    BUILD_ONCE.call_once(|| {
        let status = Command::new("cargo")
            .args(["build", "--release"])
            .status()
            .expect("Failed to run cargo build");
        assert!(status.success(), "Cargo build failed");
    });
}

fn release_dir() -> PathBuf {
    std::env::var_os("CARGO_TARGET_DIR")
        .map_or_else(|| PathBuf::from("../../target"), PathBuf::from)
        .join("release")
}

/// Checks if a tool is available in PATH.
fn tool_available(cmd: &str, arg: &str) -> bool {
    Command::new(cmd).arg(arg).output().is_ok()
}

/// Prints a skip warning visible even when cargo captures output.
fn warn_skip(what: &str) {
    let msg = format!("\x1b[33m\n[SKIP] {what}. Skipping C driver test.\x1b[0m\n");
    if let Ok(mut tty) = OpenOptions::new().write(true).open("/dev/tty") {
        let _ = tty.write_all(msg.as_bytes());
    } else {
        println!("{msg}");
    }
}

/// RAII struct to clean up files when they go out of scope.
struct FileCleanup(&'static str);

impl Drop for FileCleanup {
    fn drop(&mut self) {
        if Path::new(self.0).exists() {
            let _ = std::fs::remove_file(self.0);
        }
    }
}

fn assert_success(output: &Output, step: &str) {
    if !output.status.success() {
        eprintln!("STDOUT:\n{}", String::from_utf8_lossy(&output.stdout));
        eprintln!("STDERR:\n{}", String::from_utf8_lossy(&output.stderr));
        panic!("{step} failed");
    }
}

#[test]
fn test_c_driver() {
    if !tool_available("gcc", "--version") {
        warn_skip("GCC not found");
        return;
    }

    let _cleanup = FileCleanup("tests/c/test_c");
    ensure_release_build();

    let lib_dir = release_dir();
    if !lib_dir.join("libchacha20_cluster.so").exists() {
        warn_skip("shared library not found");
        return;
    }

    let compile = Command::new("gcc")
        .args(["-o", "tests/c/test_c", "tests/c/main.c", "-I", "include", "-L"])
        .arg(&lib_dir)
        .arg("-l:libchacha20_cluster.so")
        .output()
        .expect("Failed to compile C driver");
    assert_success(&compile, "C compilation");

    let run = Command::new("./tests/c/test_c")
        .env("LD_LIBRARY_PATH", &lib_dir)
        .output()
        .expect("Failed to run C driver");
    println!("{}", String::from_utf8_lossy(&run.stdout));
    assert_success(&run, "C driver");
    assert!(String::from_utf8_lossy(&run.stdout).contains("encrypt serial 76 "));
}
