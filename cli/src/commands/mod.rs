//! CLI Commands
//!
//! Harness drivers organized as separate modules.

mod single;
mod sweep;
mod verify;

pub use single::{run_single, SingleArgs};
pub use sweep::{run_sweep, SweepArgs};
pub use verify::Mismatch;
