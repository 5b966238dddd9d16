//! Master Loop
//!
//! Runs on the master core inside a cluster task. While the team computes
//! tile `k`, the fetch of tile `k + 1` is already in flight and the commit of
//! tile `k - 1` drains. With two L1 buffers this is classic ping/pong; more
//! buffers let commits lag further behind before the master has to wait.

use crate::engine::stage::StageProvider;
use crate::engine::plan::TilePlan;
use crate::engine::team::Team;
use crate::error::{OffloadError, Result};
use crate::kernels::portable::ChaChaState;
use crate::platform::l1::TileBuf;
use tracing::debug;

/// Encrypt every tile of `plan` through `stage`.
///
/// `pool` holds the free L1 tile buffers; on success every buffer is back in
/// it. On error the buffers still in flight are lost and the caller must
/// rebuild the pool.
///
/// # Errors
/// The first fault reported by the stage provider.
pub fn run_pipeline<P: StageProvider>(
    team: &mut Team,
    state: &ChaChaState,
    stage: &mut P,
    plan: &TilePlan,
    pool: &mut Vec<TileBuf>,
) -> Result<()> {
    debug!(
        len = plan.len(),
        tiles = plan.tile_count(),
        buffers = pool.len(),
        cores = team.cores(),
        "pipeline start"
    );

    let mut committing = 0usize;
    let mut tiles = plan.iter().peekable();

    if let Some(first) = tiles.peek() {
        let buf = free_buffer(stage, pool, &mut committing)?;
        stage.start_fetch(first, buf)?;
    }

    while let Some(desc) = tiles.next() {
        let mut work = stage.finish_fetch()?;

        if let Some(ahead) = tiles.peek() {
            let buf = free_buffer(stage, pool, &mut committing)?;
            stage.start_fetch(ahead, buf)?;
        }

        team.xor_tile(state, desc.counter_base, &mut work.as_mut_slice()[..desc.len]);

        stage.start_commit(&desc, work)?;
        committing += 1;
    }

    while committing > 0 {
        pool.push(stage.finish_commit()?);
        committing -= 1;
    }
    stage.flush()
}

/// Pop a free buffer, or wait for the oldest commit to hand one back.
fn free_buffer<P: StageProvider>(
    stage: &mut P,
    pool: &mut Vec<TileBuf>,
    committing: &mut usize,
) -> Result<TileBuf> {
    if let Some(buf) = pool.pop() {
        return Ok(buf);
    }
    if *committing == 0 {
        return Err(OffloadError::task_failed("no L1 tile buffer available"));
    }
    *committing -= 1;
    stage.finish_commit()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::plan::TileDescriptor;
    use crate::engine::stage::StageTraffic;
    use crate::kernels::constants::{KEY_SIZE, NONCE_SIZE};
    use crate::kernels::portable::xor_keystream;
    use std::collections::VecDeque;

    /// Synchronous in-memory provider that records the call order.
    struct Recorder {
        data: Vec<u8>,
        fetched: VecDeque<TileBuf>,
        committed: VecDeque<TileBuf>,
        log: Vec<String>,
    }

    impl StageProvider for Recorder {
        fn start_fetch(&mut self, desc: &TileDescriptor, mut buf: TileBuf) -> Result<()> {
            let range = desc.offset..desc.offset + desc.len;
            buf.as_mut_slice()[..desc.len].copy_from_slice(&self.data[range]);
            self.log.push(format!("fetch {} -> {}", desc.index, buf.addr()));
            self.fetched.push_back(buf);
            Ok(())
        }

        fn finish_fetch(&mut self) -> Result<TileBuf> {
            self.fetched.pop_front().ok_or_else(|| OffloadError::dma("empty"))
        }

        fn start_commit(&mut self, desc: &TileDescriptor, buf: TileBuf) -> Result<()> {
            let range = desc.offset..desc.offset + desc.len;
            self.data[range].copy_from_slice(&buf.as_slice()[..desc.len]);
            self.log.push(format!("commit {}", desc.index));
            self.committed.push_back(buf);
            Ok(())
        }

        fn finish_commit(&mut self) -> Result<TileBuf> {
            self.committed.pop_front().ok_or_else(|| OffloadError::dma("empty"))
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn traffic(&self) -> StageTraffic {
            StageTraffic::default()
        }
    }

    fn run(len: usize, buffers: usize) -> (Vec<u8>, Vec<String>, usize) {
        let state = ChaChaState::new(&[9; KEY_SIZE], &[8; NONCE_SIZE], 0);
        let plan = TilePlan::new(len, 256, 0).unwrap();
        let mut pool: Vec<TileBuf> = (0..buffers).map(|i| TileBuf::new(i * 256, 256)).collect();
        let mut stage = Recorder {
            data: vec![0; len],
            fetched: VecDeque::new(),
            committed: VecDeque::new(),
            log: Vec::new(),
        };
        run_pipeline(&mut Team::new(4), &state, &mut stage, &plan, &mut pool).unwrap();
        (stage.data, stage.log, pool.len())
    }

    #[test]
    fn output_matches_serial_keystream() {
        let state = ChaChaState::new(&[9; KEY_SIZE], &[8; NONCE_SIZE], 0);
        for len in [1, 255, 256, 257, 1000] {
            let mut expected = vec![0u8; len];
            xor_keystream(&state, 0, &mut expected);
            let (data, _, returned) = run(len, 2);
            assert_eq!(data, expected, "len = {len}");
            assert_eq!(returned, 2);
        }
    }

    #[test]
    fn double_buffering_prefetches_next_tile() {
        let (_, log, _) = run(3 * 256, 2);
        assert_eq!(
            log,
            [
                "fetch 0 -> 256",
                "fetch 1 -> 0",
                "commit 0",
                "fetch 2 -> 256",
                "commit 1",
                "commit 2",
            ]
        );
    }

    #[test]
    fn empty_plan_touches_nothing() {
        let (data, log, returned) = run(0, 2);
        assert!(data.is_empty());
        assert!(log.is_empty());
        assert_eq!(returned, 2);
    }
}
