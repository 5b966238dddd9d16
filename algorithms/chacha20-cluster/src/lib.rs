//! # ChaCha20 Cluster
//!
//! ChaCha20 (RFC 7539) offloaded to a compute cluster: the plaintext is cut
//! into tiles, double-buffered into a small L1 scratchpad by DMA, and the
//! 64-byte keystream blocks of each tile are spread across the cluster's
//! cores. Plaintext may live in on-chip L2 or in external RAM.

//! # Usage
//! ```rust
//! use chacha20_cluster::{chacha20_encrypt, cluster_close, cluster_init, encrypt_serial};
//! use chacha20_cluster::{CipherParams, ClusterConf};
//!
//! let mut handle = cluster_init(&ClusterConf::default())?;
//! let params = CipherParams::new([0x42; 32], [0x24; 12]);
//!
//! let mut offloaded = vec![0u8; 10_000];
//! chacha20_encrypt(&mut offloaded, &params, &mut handle)?;
//!
//! let mut reference = vec![0u8; 10_000];
//! encrypt_serial(&mut reference, &params)?;
//! assert_eq!(offloaded, reference);
//!
//! cluster_close(handle);
//! # Ok::<(), chacha20_cluster::OffloadError>(())
//! ```

// =============================================================================
// MODULES
// =============================================================================

mod context;
pub mod engine;
pub mod error;
#[doc(hidden)]
pub mod ffi;
#[doc(hidden)]
pub mod kernels; // Public for test/bench use only
mod offload;
pub mod perf;
pub mod platform;
mod types;

// =============================================================================
// EXPORTS
// =============================================================================

pub use context::ClusterHandle;
pub use error::{OffloadError, Result};
pub use offload::{
    chacha20_encrypt, chacha20_encrypt_ram, cluster_close, cluster_init, encrypt_serial,
    encrypt_serial_orig,
};
pub use perf::{PerfCounters, StatsLoop};
pub use platform::cluster::ClusterConf;
pub use platform::ram::{RamConf, RamDevice, RamRegion};
pub use types::{CipherParams, Key, Nonce};
