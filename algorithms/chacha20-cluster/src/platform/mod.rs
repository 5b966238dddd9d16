//! Simulated Platform
//!
//! Cluster device, L1 scratchpad, DMA channels and the external RAM gateway.

pub mod cluster;
pub mod dma;
pub mod l1;
pub mod ram;
