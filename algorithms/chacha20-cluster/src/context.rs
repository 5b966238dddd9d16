//! Cluster Context
//!
//! The handle returned by `cluster_init`: a powered-up cluster plus its L1
//! working set (cached state header, per-core slots, tile buffers).

use crate::engine::{
    run_pipeline, CoreSlot, L2Stage, RamStage, StageProvider, StageTraffic, StagingRing,
    StagingWindow, Team, TilePlan, RAM_STAGING_BUFFERS,
};
use crate::error::{OffloadError, Result};
use crate::kernels::constants::STATE_WORDS;
use crate::kernels::portable::ChaChaState;
use crate::perf::{elapsed_ns, PerfCounters};
use crate::platform::cluster::{ClusterConf, ClusterDevice};
use crate::platform::dma::{DmaChannel, L2Window};
use crate::platform::l1::{L1Scratch, TileBuf};
use crate::platform::ram::{RamDevice, RamRegion, RamWindow};
use crate::types::CipherParams;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Ownership token for an initialized cluster.
///
/// Exclusively owned by the caller of `init`; every encryption borrows it
/// mutably, so at most one task runs on it at a time.
pub struct ClusterHandle {
    device: ClusterDevice,
    l1: L1Scratch,
    params: CipherParams,
    header: ChaChaState,
    team: Team,
    tile_addrs: Vec<usize>,
    buffers: Vec<TileBuf>,
    last: PerfCounters,
}

impl ClusterHandle {
    /// Power up the cluster and lay out L1.
    ///
    /// L1 holds, in order: the state header, one slot descriptor per core and
    /// `l1_buffers` tile buffers.
    ///
    /// # Errors
    /// `InvalidConfig` / `ClusterOpen` from the device, `L1Exhausted` when the
    /// working set does not fit the budget.
    pub fn init(conf: &ClusterConf) -> Result<Self> {
        let device = ClusterDevice::open(conf)?;
        let mut l1 = L1Scratch::new(conf.l1_budget);

        let buffers =
            layout_l1(&mut l1, conf).inspect_err(|e| warn!(%e, "cluster L1 layout failed"))?;

        info!(
            l1_used = l1.used(),
            l1_budget = l1.budget(),
            buffers = buffers.len(),
            "cluster context ready"
        );
        let params = CipherParams::default();
        Ok(Self {
            device,
            l1,
            header: ChaChaState::new(&params.key, &params.nonce, params.counter),
            params,
            team: Team::new(conf.cores),
            tile_addrs: buffers.iter().map(TileBuf::addr).collect(),
            buffers,
            last: PerfCounters::default(),
        })
    }

    /// Release L1 and power the cluster down.
    pub fn close(self) {
        info!(l1_used = self.l1.used(), "cluster context released");
    }

    /// Configuration the cluster was opened with.
    #[must_use]
    pub const fn conf(&self) -> &ClusterConf {
        self.device.conf()
    }

    /// L1 bytes allocated by the context.
    #[must_use]
    pub const fn l1_used(&self) -> usize {
        self.l1.used()
    }

    /// Counters of the last completed task.
    #[must_use]
    pub const fn last_stats(&self) -> PerfCounters {
        self.last
    }

    /// Per-core slot descriptors of the last task.
    #[must_use]
    pub fn core_slots(&self) -> &[CoreSlot] {
        self.team.slots()
    }

    /// XOR an L2-resident buffer with the keystream for `params`.
    ///
    /// # Errors
    /// `CounterOverflow` for oversized inputs; DMA faults abort the task.
    pub fn encrypt_l2(&mut self, data: &mut [u8], params: &CipherParams) -> Result<()> {
        let plan = self.prepare(data.len(), params)?;
        let start = Instant::now();

        let Self {
            device,
            header,
            team,
            buffers,
            ..
        } = self;
        let outcome = device.send_task(move || {
            thread::scope(|s| {
                let dma = DmaChannel::spawn(s, "l2", L2Window::new(data))?;
                let mut stage = L2Stage::new(dma);
                run_pipeline(team, header, &mut stage, &plan, buffers)?;
                Ok(stage.traffic())
            })
        });

        self.settle(&plan, start, outcome)
    }

    /// XOR the first `len` bytes of an external RAM region in place.
    ///
    /// # Errors
    /// `RamOutOfBounds` if `len` exceeds the region, `CounterOverflow` for
    /// oversized inputs; DMA and RAM faults abort the task.
    pub fn encrypt_ram(
        &mut self,
        ram: &RamDevice,
        region: &RamRegion,
        len: usize,
        params: &CipherParams,
    ) -> Result<()> {
        if len > region.len() {
            return Err(OffloadError::RamOutOfBounds {
                offset: 0,
                len,
                limit: region.len(),
            });
        }
        let plan = self.prepare(len, params)?;
        let tile_size = self.conf().tile_size;
        let window = RamWindow::new(ram, *region);
        let start = Instant::now();

        let Self {
            device,
            header,
            team,
            buffers,
            ..
        } = self;
        let outcome = device.send_task(move || {
            let ring = StagingRing::new(RAM_STAGING_BUFFERS, tile_size);
            thread::scope(|s| {
                let ram_dma = DmaChannel::spawn(s, "ram", window)?;
                let staging = StagingWindow::new(&ring, RAM_STAGING_BUFFERS);
                let cluster_dma = DmaChannel::spawn(s, "cluster", staging)?;
                let mut stage = RamStage::new(ram_dma, cluster_dma, &ring, plan);
                run_pipeline(team, header, &mut stage, &plan, buffers)?;
                Ok(stage.traffic())
            })
        });

        self.settle(&plan, start, outcome)
    }

    /// Plan the task and refresh the cached header if the parameters changed.
    fn prepare(&mut self, len: usize, params: &CipherParams) -> Result<TilePlan> {
        let plan = TilePlan::new(len, self.conf().tile_size, params.counter)?;
        if !params.ct_matches(&self.params) {
            self.params = *params;
            self.header = ChaChaState::new(&params.key, &params.nonce, params.counter);
            trace!("state header reloaded");
        }
        self.team.reset();
        Ok(plan)
    }

    /// Record counters, or restore the L1 pool after a failed task.
    fn settle(
        &mut self,
        plan: &TilePlan,
        start: Instant,
        outcome: Result<StageTraffic>,
    ) -> Result<()> {
        let traffic = match outcome {
            Ok(traffic) => traffic,
            Err(e) => {
                warn!(%e, "cluster task aborted");
                self.restore_buffers();
                return Err(e);
            }
        };

        self.last = PerfCounters {
            elapsed_ns: elapsed_ns(start),
            blocks: self.team.slots().iter().map(|s| s.blocks).sum(),
            tiles: plan.tile_count() as u64,
            dma_in_bytes: traffic.l1_in,
            dma_out_bytes: traffic.l1_out,
            dma_waits: traffic.waits,
            barriers: self.team.barriers(),
            ram_bytes: traffic.ram,
        };
        debug!(len = plan.len(), elapsed_ns = self.last.elapsed_ns, "cluster task done");
        Ok(())
    }

    fn restore_buffers(&mut self) {
        let tile_size = self.conf().tile_size;
        self.buffers = self
            .tile_addrs
            .iter()
            .map(|&addr| TileBuf::new(addr, tile_size))
            .collect();
    }
}

fn layout_l1(l1: &mut L1Scratch, conf: &ClusterConf) -> Result<Vec<TileBuf>> {
    l1.alloc(STATE_WORDS * 4, "state header")?;
    l1.alloc(conf.cores * std::mem::size_of::<CoreSlot>(), "core slots")?;
    (0..conf.l1_buffers)
        .map(|_| l1.alloc_tile(conf.tile_size))
        .collect()
}

impl core::fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("device", &self.device)
            .field("l1_used", &self.l1.used())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
