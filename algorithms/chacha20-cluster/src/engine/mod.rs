//! Tile Pipeline Engine
//!
//! Tiling, the block-parallel compute stage, the residency-specific stage
//! providers and the master loop that ties them together.

pub mod pipeline;
pub mod plan;
pub mod stage;
pub mod team;

pub use pipeline::run_pipeline;
pub use plan::{TileDescriptor, TilePlan};
pub use stage::{
    L2Stage, RamStage, StageProvider, StageTraffic, StagingRing, StagingWindow, RAM_STAGING_BUFFERS,
};
pub use team::{CoreSlot, Team};
