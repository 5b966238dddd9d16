//! Performance Counters
//!
//! Per-task counters collected by the cluster context, and the warm-up /
//! repeat loop the harness wraps around each timed region.

use std::fmt;
use std::time::Instant;

/// Counters for one timed region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfCounters {
    /// Wall-clock time of the region.
    pub elapsed_ns: u64,
    /// Keystream blocks generated across all cores.
    pub blocks: u64,
    /// Tiles pushed through the pipeline.
    pub tiles: u64,
    /// Bytes moved into L1.
    pub dma_in_bytes: u64,
    /// Bytes moved out of L1.
    pub dma_out_bytes: u64,
    /// Blocking DMA waits on the master core.
    pub dma_waits: u64,
    /// Cluster barriers crossed.
    pub barriers: u64,
    /// Bytes transferred to and from external RAM.
    pub ram_bytes: u64,
}

impl PerfCounters {
    /// Time `region`; every other counter stays zero.
    pub fn time<F: FnOnce()>(region: F) -> Self {
        let start = Instant::now();
        region();
        Self {
            elapsed_ns: elapsed_ns(start),
            ..Self::default()
        }
    }

    /// Add `other` field by field.
    pub fn accumulate(&mut self, other: &Self) {
        self.elapsed_ns += other.elapsed_ns;
        self.blocks += other.blocks;
        self.tiles += other.tiles;
        self.dma_in_bytes += other.dma_in_bytes;
        self.dma_out_bytes += other.dma_out_bytes;
        self.dma_waits += other.dma_waits;
        self.barriers += other.barriers;
        self.ram_bytes += other.ram_bytes;
    }

    /// Per-run average over `runs` accumulated runs.
    #[must_use]
    pub fn averaged(&self, runs: u32) -> Self {
        let n = u64::from(runs.max(1));
        Self {
            elapsed_ns: self.elapsed_ns / n,
            blocks: self.blocks / n,
            tiles: self.tiles / n,
            dma_in_bytes: self.dma_in_bytes / n,
            dma_out_bytes: self.dma_out_bytes / n,
            dma_waits: self.dma_waits / n,
            barriers: self.barriers / n,
            ram_bytes: self.ram_bytes / n,
        }
    }
}

impl fmt::Display for PerfCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0] elapsed = {} ns", self.elapsed_ns)?;
        if self.blocks > 0 {
            write!(
                f,
                "\n[1] blocks = {}\n[2] tiles = {}\n[3] dma in = {} B\n[4] dma out = {} B\n[5] dma waits = {}\n[6] barriers = {}",
                self.blocks,
                self.tiles,
                self.dma_in_bytes,
                self.dma_out_bytes,
                self.dma_waits,
                self.barriers
            )?;
        }
        if self.ram_bytes > 0 {
            write!(f, "\n[7] ram = {} B", self.ram_bytes)?;
        }
        Ok(())
    }
}

/// Nanoseconds since `start`, saturating.
pub(crate) fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

// =============================================================================
// STATS LOOP
// =============================================================================

/// Warm-up and repeat counts for a timed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsLoop {
    /// Untimed warm-up runs.
    pub hotting: u32,
    /// Timed runs that are averaged.
    pub repeat: u32,
}

impl Default for StatsLoop {
    fn default() -> Self {
        Self {
            hotting: 1,
            repeat: 3,
        }
    }
}

impl StatsLoop {
    /// Run `region` `hotting + repeat` times and average the last `repeat`.
    ///
    /// # Errors
    /// Stops at the first failing run and returns its error.
    pub fn run<E, F>(&self, mut region: F) -> Result<PerfCounters, E>
    where
        F: FnMut() -> Result<PerfCounters, E>,
    {
        for _ in 0..self.hotting {
            region()?;
        }
        let mut total = PerfCounters::default();
        for _ in 0..self.repeat {
            total.accumulate(&region()?);
        }
        Ok(total.averaged(self.repeat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmups_are_not_counted() {
        let stats = StatsLoop {
            hotting: 2,
            repeat: 3,
        };
        let mut run = 0u64;
        let avg = stats
            .run::<(), _>(|| {
                run += 1;
                // warm-ups report huge numbers that must not leak into the average
                let blocks = if run <= 2 { 1_000_000 } else { run * 10 };
                Ok(PerfCounters {
                    blocks,
                    ..PerfCounters::default()
                })
            })
            .unwrap_or_default();
        assert_eq!(run, 5);
        assert_eq!(avg.blocks, (30 + 40 + 50) / 3);
    }

    #[test]
    fn first_error_stops_the_loop() {
        let mut calls = 0;
        let result = StatsLoop::default().run(|| {
            calls += 1;
            if calls == 2 {
                Err("fault")
            } else {
                Ok(PerfCounters::default())
            }
        });
        assert_eq!(result, Err("fault"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn display_skips_empty_sections() {
        let text = PerfCounters {
            elapsed_ns: 12,
            ..PerfCounters::default()
        }
        .to_string();
        assert_eq!(text, "[0] elapsed = 12 ns");

        let full = PerfCounters {
            blocks: 1,
            ram_bytes: 64,
            ..PerfCounters::default()
        }
        .to_string();
        assert!(full.contains("[1] blocks = 1"));
        assert!(full.contains("[7] ram = 64 B"));
    }
}
