//! Error types for cluster offload operations

use thiserror::Error;

/// Result type alias for offload operations
pub type Result<T> = std::result::Result<T, OffloadError>;

/// Errors raised by the cluster, the external RAM gateway and the pipeline
///
/// None of these are recoverable inside a task: the pipeline aborts on the
/// first one and hands it back to the host.
#[derive(Debug, Error)]
pub enum OffloadError {
    /// Configuration rejected before touching any device
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it
        reason: String,
    },

    /// Cluster could not be powered up
    #[error("Cluster open failed: {reason}")]
    ClusterOpen {
        /// Reason for failure
        reason: String,
    },

    /// L1 scratchpad cannot hold the requested allocation
    #[error("L1 exhausted allocating {what}: need {requested} bytes, {available} of {budget} left")]
    L1Exhausted {
        /// Purpose of the allocation
        what: &'static str,
        /// Bytes requested (after rounding)
        requested: usize,
        /// Bytes still free
        available: usize,
        /// Total scratchpad size
        budget: usize,
    },

    /// Payload would run the 32-bit block counter past its end
    #[error("Keystream exhausted: {len} bytes from block {counter} overflow the 32-bit counter")]
    CounterOverflow {
        /// Payload length in bytes
        len: u64,
        /// Initial block counter
        counter: u32,
    },

    /// DMA transfer failed or the channel went away
    #[error("DMA fault: {reason}")]
    Dma {
        /// Reason for failure
        reason: String,
        /// Fault raised by the far-side memory, if any
        #[source]
        source: Option<Box<OffloadError>>,
    },

    /// External RAM device could not be opened
    #[error("External RAM open failed: {reason}")]
    RamOpen {
        /// Reason for failure
        reason: String,
    },

    /// No free block large enough in external RAM
    #[error("External RAM exhausted: requested {requested} bytes, largest free block {largest}")]
    RamExhausted {
        /// Requested length
        requested: usize,
        /// Largest free block available
        largest: usize,
    },

    /// Transfer falls outside the region or the device
    #[error("External RAM access out of bounds: {offset:#x} + {len} > {limit:#x}")]
    RamOutOfBounds {
        /// Start of the access
        offset: usize,
        /// Access length
        len: usize,
        /// End of the addressable window
        limit: usize,
    },

    /// Device used after `close`
    #[error("External RAM device is closed")]
    RamClosed,

    /// Device state is unusable (poisoned lock, bad free)
    #[error("External RAM fault: {reason}")]
    RamFault {
        /// Reason for failure
        reason: String,
    },

    /// Cluster task did not complete
    #[error("Cluster task failed: {reason}")]
    TaskFailed {
        /// Reason for failure
        reason: String,
    },
}

impl OffloadError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a DMA fault
    pub fn dma(reason: impl Into<String>) -> Self {
        Self::Dma {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a DMA fault caused by the far-side memory
    pub fn dma_caused_by(reason: impl Into<String>, cause: Self) -> Self {
        Self::Dma {
            reason: reason.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Create an external RAM fault
    pub fn ram_fault(reason: impl Into<String>) -> Self {
        Self::RamFault {
            reason: reason.into(),
        }
    }

    /// Create a task failure
    pub fn task_failed(reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            reason: reason.into(),
        }
    }

    /// A device (cluster or external RAM) could not be opened.
    #[must_use]
    pub const fn is_device_open_failure(&self) -> bool {
        matches!(self, Self::ClusterOpen { .. } | Self::RamOpen { .. })
    }

    /// Setup failed after the devices were opened (allocation, configuration).
    #[must_use]
    pub const fn is_init_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::L1Exhausted { .. } | Self::RamExhausted { .. }
        )
    }
}
