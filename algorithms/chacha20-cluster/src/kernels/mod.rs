//! ChaCha20 Kernels
//!
//! Block function and constants shared by the serial oracle and the cluster
//! workers.

pub mod constants;
pub mod portable;
