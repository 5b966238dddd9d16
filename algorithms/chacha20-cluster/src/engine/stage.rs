//! Stage Providers
//!
//! The pipeline only knows how to ask for "the next input tile in L1" and
//! "write this L1 tile back". Where the plaintext actually lives is the
//! provider's business:
//!
//! - [`L2Stage`]: plaintext in on-chip L2, one DMA hop each way.
//! - [`RamStage`]: plaintext in external RAM, staged through a ring of L2
//!   buffers. The RAM↔L2 leg runs on the RAM channel and the L2↔L1 hop on
//!   the cluster channel, so neither leg blocks the master until it asks
//!   for a finished tile.

use crate::engine::plan::{TileDescriptor, TilePlan};
use crate::error::{OffloadError, Result};
use crate::platform::dma::{Completion, DmaChannel, DmaDir, Memory};
use crate::platform::l1::TileBuf;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// L2 staging buffers between external RAM and L1.
pub const RAM_STAGING_BUFFERS: usize = 3;

/// RAM fetches allowed in flight; keeps one staging buffer for write-back.
const RAM_FETCH_DEPTH: usize = RAM_STAGING_BUFFERS - 1;

/// Traffic a provider moved during one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTraffic {
    /// Bytes delivered into L1.
    pub l1_in: u64,
    /// Bytes drained out of L1.
    pub l1_out: u64,
    /// Blocking waits on DMA completions.
    pub waits: u64,
    /// Bytes moved to and from external RAM.
    pub ram: u64,
}

/// Source and sink of L1 tiles for the pipeline.
///
/// Fetches complete in issue order, and so do commits.
pub trait StageProvider {
    /// Start moving tile `desc` into `buf`.
    ///
    /// # Errors
    /// Transfer faults.
    fn start_fetch(&mut self, desc: &TileDescriptor, buf: TileBuf) -> Result<()>;

    /// Wait for the oldest fetch and return its filled buffer.
    ///
    /// # Errors
    /// Transfer faults, or no fetch outstanding.
    fn finish_fetch(&mut self) -> Result<TileBuf>;

    /// Start writing back `buf`, which holds the result for `desc`.
    ///
    /// # Errors
    /// Transfer faults.
    fn start_commit(&mut self, desc: &TileDescriptor, buf: TileBuf) -> Result<()>;

    /// Wait for the oldest commit and return the freed L1 buffer.
    ///
    /// # Errors
    /// Transfer faults, or no commit outstanding.
    fn finish_commit(&mut self) -> Result<TileBuf>;

    /// Complete every outstanding write-back to the plaintext's home.
    ///
    /// # Errors
    /// Transfer faults.
    fn flush(&mut self) -> Result<()>;

    /// Traffic moved so far.
    fn traffic(&self) -> StageTraffic;
}

// =============================================================================
// L2 RESIDENT
// =============================================================================

/// Plaintext in L2: one cluster DMA channel, fetch and commit on it directly.
pub struct L2Stage<'scope> {
    dma: DmaChannel<'scope>,
}

impl<'scope> L2Stage<'scope> {
    /// Provider over a channel bound to the L2 plaintext.
    #[must_use]
    pub const fn new(dma: DmaChannel<'scope>) -> Self {
        Self { dma }
    }
}

impl StageProvider for L2Stage<'_> {
    fn start_fetch(&mut self, desc: &TileDescriptor, buf: TileBuf) -> Result<()> {
        self.dma.issue(DmaDir::Fetch, desc.offset, desc.len, buf)
    }

    fn finish_fetch(&mut self) -> Result<TileBuf> {
        Ok(self.dma.wait(DmaDir::Fetch)?.buf)
    }

    fn start_commit(&mut self, desc: &TileDescriptor, buf: TileBuf) -> Result<()> {
        self.dma.issue(DmaDir::Commit, desc.offset, desc.len, buf)
    }

    fn finish_commit(&mut self) -> Result<TileBuf> {
        Ok(self.dma.wait(DmaDir::Commit)?.buf)
    }

    fn flush(&mut self) -> Result<()> {
        match self.dma.pending() {
            0 => Ok(()),
            n => Err(OffloadError::dma(format!("{n} L2 transfers still pending"))),
        }
    }

    fn traffic(&self) -> StageTraffic {
        let stats = self.dma.stats();
        StageTraffic {
            l1_in: stats.fetched,
            l1_out: stats.committed,
            waits: stats.waits,
            ram: 0,
        }
    }
}

// =============================================================================
// L2 STAGING RING
// =============================================================================

/// Tile-sized L2 slots between external RAM and L1.
///
/// A staging buffer is docked in its slot while the cluster channel moves
/// bytes between it and L1, and undocked while the RAM channel owns it.
/// Slot `i` lives at L2 address `i * tile_size`.
#[derive(Debug)]
pub struct StagingRing {
    tile_size: usize,
    slots: Mutex<Vec<Option<TileBuf>>>,
}

impl StagingRing {
    /// Empty ring of `slots` slots.
    #[must_use]
    pub fn new(slots: usize, tile_size: usize) -> Self {
        Self {
            tile_size,
            slots: Mutex::new((0..slots).map(|_| None).collect()),
        }
    }

    /// Bytes per slot.
    #[must_use]
    pub const fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Undocked staging buffers, one per slot.
    #[must_use]
    pub fn buffers(&self, count: usize) -> Vec<TileBuf> {
        (0..count)
            .map(|i| TileBuf::new(i * self.tile_size, self.tile_size))
            .collect()
    }

    /// Park `buf` in the slot its address names. Returns the slot.
    ///
    /// # Errors
    /// Fails if the slot does not exist or is occupied.
    pub fn dock(&self, buf: TileBuf) -> Result<usize> {
        let slot = buf.addr() / self.tile_size;
        let mut slots = self.lock()?;
        match slots.get_mut(slot) {
            Some(entry) if entry.is_none() => {
                *entry = Some(buf);
                Ok(slot)
            }
            Some(_) => Err(OffloadError::dma(format!("staging slot {slot} is occupied"))),
            None => Err(OffloadError::dma(format!("no staging slot {slot}"))),
        }
    }

    /// Take the buffer back out of `slot`.
    ///
    /// # Errors
    /// Fails if the slot is empty.
    pub fn undock(&self, slot: usize) -> Result<TileBuf> {
        self.lock()?
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or_else(|| OffloadError::dma(format!("staging slot {slot} is empty")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Option<TileBuf>>>> {
        self.slots
            .lock()
            .map_err(|_| OffloadError::dma("staging ring lock poisoned"))
    }

    /// Run `f` on the docked bytes addressed by `offset..offset + len`.
    fn with_slot<T>(
        &self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Result<T> {
        let slot = offset / self.tile_size;
        let at = offset % self.tile_size;
        let end = at
            .checked_add(len)
            .filter(|&end| end <= self.tile_size)
            .ok_or_else(|| {
                OffloadError::dma(format!("staging transfer {offset:#x}+{len} crosses a slot"))
            })?;
        let mut slots = self.lock()?;
        let buf = slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or_else(|| OffloadError::dma(format!("staging slot {slot} is empty")))?;
        Ok(f(&mut buf.as_mut_slice()[at..end]))
    }
}

/// The staging ring as seen by the cluster channel.
#[derive(Debug, Clone, Copy)]
pub struct StagingWindow<'a> {
    ring: &'a StagingRing,
    slots: usize,
}

impl<'a> StagingWindow<'a> {
    /// Window over all `slots` slots of `ring`.
    #[must_use]
    pub const fn new(ring: &'a StagingRing, slots: usize) -> Self {
        Self { ring, slots }
    }
}

impl Memory for StagingWindow<'_> {
    fn size(&self) -> usize {
        self.slots * self.ring.tile_size
    }

    fn read_into(&mut self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.ring
            .with_slot(offset, dst.len(), |src| dst.copy_from_slice(src))
    }

    fn write_from(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        self.ring
            .with_slot(offset, src.len(), |dst| dst.copy_from_slice(src))
    }
}

// =============================================================================
// EXTERNAL-RAM RESIDENT
// =============================================================================

/// Plaintext in external RAM.
///
/// A tile travels RAM→L2 on the RAM channel, then L2→L1 on the cluster
/// channel; results go back L1→L2→RAM the same way. `start_*` only queue
/// work and hand transfers to whichever channel can take them; the master
/// blocks in `finish_*`, and only on the leg it actually needs.
///
/// At most `RAM_FETCH_DEPTH` staging buffers serve fetches, so a
/// write-back always finds a buffer once earlier write-backs retire.
pub struct RamStage<'scope> {
    ram: DmaChannel<'scope>,
    cluster: DmaChannel<'scope>,
    ring: &'scope StagingRing,
    plan: TilePlan,
    free: Vec<TileBuf>,
    next_fetch: usize,
    /// RAM→L2 in flight.
    ram_fetching: VecDeque<TileDescriptor>,
    /// In L2, docked, waiting for an L1 buffer.
    landed: VecDeque<(TileDescriptor, usize)>,
    /// L1 buffers waiting for their tile to land.
    waiting: VecDeque<(TileDescriptor, TileBuf)>,
    /// L2→L1 in flight, by slot.
    hopping_in: VecDeque<usize>,
    ready: VecDeque<TileBuf>,
    /// Results waiting for a staging buffer.
    outgoing: VecDeque<(TileDescriptor, TileBuf)>,
    /// L1→L2 in flight.
    hopping_out: VecDeque<TileDescriptor>,
    ram_committing: usize,
    drained: VecDeque<TileBuf>,
}

impl<'scope> RamStage<'scope> {
    /// Provider over a RAM channel bound to the region and a cluster channel
    /// bound to `ring`.
    #[must_use]
    pub fn new(
        ram: DmaChannel<'scope>,
        cluster: DmaChannel<'scope>,
        ring: &'scope StagingRing,
        plan: TilePlan,
    ) -> Self {
        Self {
            ram,
            cluster,
            ring,
            plan,
            free: ring.buffers(RAM_STAGING_BUFFERS),
            next_fetch: 0,
            ram_fetching: VecDeque::new(),
            landed: VecDeque::new(),
            waiting: VecDeque::new(),
            hopping_in: VecDeque::new(),
            ready: VecDeque::new(),
            outgoing: VecDeque::new(),
            hopping_out: VecDeque::new(),
            ram_committing: 0,
            drained: VecDeque::new(),
        }
    }

    fn slot_addr(&self, slot: usize) -> usize {
        slot * self.ring.tile_size()
    }

    fn slot_of(&self, offset: usize) -> usize {
        offset / self.ring.tile_size()
    }

    // -------------------------------------------------------------------------
    // Completions
    // -------------------------------------------------------------------------

    fn on_ram_fetch(&mut self, done: Completion) -> Result<()> {
        let desc = self
            .ram_fetching
            .pop_front()
            .ok_or_else(|| OffloadError::dma("unexpected RAM fetch"))?;
        if done.offset != desc.offset || done.len != desc.len {
            return Err(OffloadError::dma(format!(
                "staging ring out of order: expected tile at {:#x}, got {:#x}",
                desc.offset, done.offset
            )));
        }
        let slot = self.ring.dock(done.buf)?;
        trace!(tile = desc.index, slot, "ram fetch landed");
        self.landed.push_back((desc, slot));
        Ok(())
    }

    fn on_ram_commit(&mut self, done: Completion) {
        self.ram_committing = self.ram_committing.saturating_sub(1);
        self.free.push(done.buf);
    }

    fn on_hop_in(&mut self, done: Completion) -> Result<()> {
        let slot = self
            .hopping_in
            .pop_front()
            .ok_or_else(|| OffloadError::dma("unexpected L1 fetch"))?;
        debug_assert_eq!(slot, self.slot_of(done.offset));
        self.free.push(self.ring.undock(slot)?);
        self.ready.push_back(done.buf);
        Ok(())
    }

    fn on_hop_out(&mut self, done: Completion) -> Result<()> {
        let desc = self
            .hopping_out
            .pop_front()
            .ok_or_else(|| OffloadError::dma("unexpected L1 commit"))?;
        let staged = self.ring.undock(self.slot_of(done.offset))?;
        trace!(tile = desc.index, "ram commit");
        self.ram.issue(DmaDir::Commit, desc.offset, desc.len, staged)?;
        self.ram_committing += 1;
        self.drained.push_back(done.buf);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Issue
    // -------------------------------------------------------------------------

    /// Pair landed tiles with waiting L1 buffers.
    fn issue_hops(&mut self) -> Result<bool> {
        let mut issued = false;
        while let (Some(&(desc, slot)), Some((want, _))) =
            (self.landed.front(), self.waiting.front())
        {
            if desc.index != want.index {
                return Err(OffloadError::dma(format!(
                    "staging ring out of order: tile {} landed for tile {}",
                    desc.index, want.index
                )));
            }
            let Some((_, buf)) = self.waiting.pop_front() else {
                break;
            };
            self.landed.pop_front();
            self.cluster
                .issue(DmaDir::Fetch, self.slot_addr(slot), desc.len, buf)?;
            self.hopping_in.push_back(slot);
            issued = true;
        }
        Ok(issued)
    }

    /// Move results into free staging buffers.
    fn issue_commits(&mut self) -> Result<bool> {
        let mut issued = false;
        while !self.outgoing.is_empty() {
            let Some(staged) = self.free.pop() else {
                break;
            };
            let Some((desc, buf)) = self.outgoing.pop_front() else {
                self.free.push(staged);
                break;
            };
            let slot = self.ring.dock(staged)?;
            self.cluster
                .issue(DmaDir::Commit, self.slot_addr(slot), desc.len, buf)?;
            self.hopping_out.push_back(desc);
            issued = true;
        }
        Ok(issued)
    }

    /// Run RAM fetches ahead, bounded by the fetch depth.
    fn issue_fetches(&mut self) -> Result<bool> {
        let mut issued = false;
        while self.ram_fetching.len() + self.landed.len() + self.hopping_in.len() < RAM_FETCH_DEPTH
        {
            let Some(desc) = self.plan.tile(self.next_fetch) else {
                break;
            };
            let Some(staged) = self.free.pop() else {
                break;
            };
            trace!(tile = desc.index, "ram fetch");
            self.ram.issue(DmaDir::Fetch, desc.offset, desc.len, staged)?;
            self.ram_fetching.push_back(desc);
            self.next_fetch += 1;
            issued = true;
        }
        Ok(issued)
    }

    /// Retire whatever has finished and issue whatever can go, without blocking.
    fn pump(&mut self) -> Result<()> {
        loop {
            let mut progress = false;
            while let Some(done) = self.ram.poll(DmaDir::Fetch)? {
                self.on_ram_fetch(done)?;
                progress = true;
            }
            while let Some(done) = self.ram.poll(DmaDir::Commit)? {
                self.on_ram_commit(done);
                progress = true;
            }
            while let Some(done) = self.cluster.poll(DmaDir::Fetch)? {
                self.on_hop_in(done)?;
                progress = true;
            }
            while let Some(done) = self.cluster.poll(DmaDir::Commit)? {
                self.on_hop_out(done)?;
                progress = true;
            }
            progress |= self.issue_hops()?;
            progress |= self.issue_commits()?;
            progress |= self.issue_fetches()?;
            if !progress {
                return Ok(());
            }
        }
    }

    /// Block until some staging buffer is on its way back to the free list.
    fn reclaim(&mut self) -> Result<()> {
        if !self.free.is_empty() {
            return Err(OffloadError::dma("staging ring stalled"));
        }
        if self.ram_committing > 0 {
            let done = self.ram.wait(DmaDir::Commit)?;
            self.on_ram_commit(done);
        } else if !self.hopping_out.is_empty() {
            let done = self.cluster.wait(DmaDir::Commit)?;
            self.on_hop_out(done)?;
        } else if !self.hopping_in.is_empty() {
            let done = self.cluster.wait(DmaDir::Fetch)?;
            self.on_hop_in(done)?;
        } else {
            return Err(OffloadError::dma("staging ring exhausted"));
        }
        Ok(())
    }
}

impl StageProvider for RamStage<'_> {
    fn start_fetch(&mut self, desc: &TileDescriptor, buf: TileBuf) -> Result<()> {
        self.waiting.push_back((*desc, buf));
        self.pump()
    }

    fn finish_fetch(&mut self) -> Result<TileBuf> {
        loop {
            self.pump()?;
            if let Some(buf) = self.ready.pop_front() {
                return Ok(buf);
            }
            if !self.hopping_in.is_empty() {
                let done = self.cluster.wait(DmaDir::Fetch)?;
                self.on_hop_in(done)?;
            } else if self.waiting.is_empty() {
                return Err(OffloadError::dma("no fetch outstanding"));
            } else if !self.ram_fetching.is_empty() {
                let done = self.ram.wait(DmaDir::Fetch)?;
                self.on_ram_fetch(done)?;
            } else {
                self.reclaim()?;
            }
        }
    }

    fn start_commit(&mut self, desc: &TileDescriptor, buf: TileBuf) -> Result<()> {
        self.outgoing.push_back((*desc, buf));
        self.pump()
    }

    fn finish_commit(&mut self) -> Result<TileBuf> {
        loop {
            self.pump()?;
            if let Some(buf) = self.drained.pop_front() {
                return Ok(buf);
            }
            if !self.hopping_out.is_empty() {
                let done = self.cluster.wait(DmaDir::Commit)?;
                self.on_hop_out(done)?;
            } else if self.outgoing.is_empty() {
                return Err(OffloadError::dma("no commit outstanding"));
            } else {
                self.reclaim()?;
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.pump()?;
        if !self.outgoing.is_empty() || !self.hopping_out.is_empty() {
            return Err(OffloadError::dma(format!(
                "{} write-backs still in L1",
                self.outgoing.len() + self.hopping_out.len()
            )));
        }
        while self.ram_committing > 0 {
            let done = self.ram.wait(DmaDir::Commit)?;
            self.on_ram_commit(done);
        }
        trace!(staging = self.free.len(), "ram write-backs flushed");
        Ok(())
    }

    fn traffic(&self) -> StageTraffic {
        let ram = self.ram.stats();
        let cluster = self.cluster.stats();
        StageTraffic {
            l1_in: cluster.fetched,
            l1_out: cluster.committed,
            waits: ram.waits + cluster.waits,
            ram: ram.fetched + ram.committed,
        }
    }
}
