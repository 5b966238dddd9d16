//! Compute Cluster Device
//!
//! The cluster is a fixed team of worker cores dispatched as a batch by the
//! host. With the `multithread` feature each core is a named rayon worker;
//! without it, tasks run inline on the calling thread.

use crate::error::{OffloadError, Result};
use tracing::{info, warn};

/// Upper bound on cores per cluster.
pub const MAX_CORES: usize = 32;

/// Smallest tile: one ChaCha20 block.
pub const MIN_TILE_SIZE: usize = 64;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Cluster geometry and L1 sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterConf {
    /// Worker cores (power of two, `1..=32`).
    pub cores: usize,
    /// Tile size in bytes (power of two, at least 64).
    pub tile_size: usize,
    /// L1 scratchpad budget in bytes.
    pub l1_budget: usize,
    /// L1 tile buffers in the pipeline (2 = double buffering).
    pub l1_buffers: usize,
}

impl Default for ClusterConf {
    fn default() -> Self {
        Self {
            cores: 8,
            tile_size: 4096,
            l1_budget: 64 * 1024,
            l1_buffers: 2,
        }
    }
}

impl ClusterConf {
    /// Check the geometry before any device is touched.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.cores.is_power_of_two() || self.cores > MAX_CORES {
            return Err(OffloadError::invalid_config(format!(
                "cores must be a power of two in 1..={MAX_CORES}, got {}",
                self.cores
            )));
        }
        if !self.tile_size.is_power_of_two() || self.tile_size < MIN_TILE_SIZE {
            return Err(OffloadError::invalid_config(format!(
                "tile_size must be a power of two >= {MIN_TILE_SIZE}, got {}",
                self.tile_size
            )));
        }
        if self.l1_buffers < 2 {
            return Err(OffloadError::invalid_config(format!(
                "l1_buffers must be at least 2, got {}",
                self.l1_buffers
            )));
        }
        Ok(())
    }
}

// =============================================================================
// DEVICE
// =============================================================================

/// A powered-up cluster.
pub struct ClusterDevice {
    conf: ClusterConf,
    #[cfg(feature = "multithread")]
    pool: rayon::ThreadPool,
}

impl ClusterDevice {
    /// Validate `conf` and power up the cluster.
    ///
    /// # Errors
    /// `InvalidConfig` for a bad geometry, `ClusterOpen` if the cores cannot
    /// be started.
    pub fn open(conf: &ClusterConf) -> Result<Self> {
        conf.validate().inspect_err(|e| warn!(%e, "cluster config rejected"))?;

        #[cfg(feature = "multithread")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(conf.cores)
            .thread_name(|id| format!("cluster-core-{id}"))
            .start_handler(|id| tracing::trace!(core = id, "dispatch stub installed"))
            .build()
            .map_err(|e| OffloadError::ClusterOpen {
                reason: e.to_string(),
            })?;

        info!(
            cores = conf.cores,
            tile_size = conf.tile_size,
            l1_budget = conf.l1_budget,
            "cluster powered up"
        );
        Ok(Self {
            conf: *conf,
            #[cfg(feature = "multithread")]
            pool,
        })
    }

    /// Configuration the cluster was opened with.
    #[must_use]
    pub const fn conf(&self) -> &ClusterConf {
        &self.conf
    }

    /// Number of worker cores.
    #[must_use]
    pub const fn cores(&self) -> usize {
        self.conf.cores
    }

    /// Run `task` on the cluster and block until it returns.
    pub fn send_task<F, R>(&self, task: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        #[cfg(feature = "multithread")]
        {
            self.pool.install(task)
        }
        #[cfg(not(feature = "multithread"))]
        {
            task()
        }
    }
}

impl Drop for ClusterDevice {
    fn drop(&mut self) {
        info!(cores = self.conf.cores, "cluster powered down");
    }
}

impl core::fmt::Debug for ClusterDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClusterDevice")
            .field("conf", &self.conf)
            .finish_non_exhaustive()
    }
}
