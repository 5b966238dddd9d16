//! DMA Channels
//!
//! An asynchronous copy engine between one far-side memory (L2 or external
//! RAM) and tile buffers. Each channel runs on a scoped thread that owns the
//! far memory for the lifetime of the transfer session, so the host cannot
//! touch that memory while a task is in flight.
//!
//! Requests are served strictly in issue order. A waiter asking for one
//! direction stashes completions of the other direction until it is asked
//! for them.

use crate::error::{OffloadError, Result};
use crate::platform::l1::TileBuf;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, Scope};
use tracing::trace;

// =============================================================================
// FAR MEMORY
// =============================================================================

/// Far-side memory a DMA channel transfers to and from.
pub trait Memory: Send {
    /// Addressable size in bytes.
    fn size(&self) -> usize;

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// # Errors
    /// Fails if the range is outside the memory.
    fn read_into(&mut self, offset: usize, dst: &mut [u8]) -> Result<()>;

    /// Copy `src` to `offset`.
    ///
    /// # Errors
    /// Fails if the range is outside the memory.
    fn write_from(&mut self, offset: usize, src: &[u8]) -> Result<()>;
}

/// On-chip L2 buffer lent to a channel for one task.
#[derive(Debug)]
pub struct L2Window<'a>(&'a mut [u8]);

impl<'a> L2Window<'a> {
    /// Wrap the host buffer.
    pub fn new(data: &'a mut [u8]) -> Self {
        Self(data)
    }

    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.0.len() => Ok(offset..end),
            _ => Err(OffloadError::dma(format!(
                "L2 transfer {offset:#x}+{len} outside {} byte buffer",
                self.0.len()
            ))),
        }
    }
}

impl Memory for L2Window<'_> {
    fn size(&self) -> usize {
        self.0.len()
    }

    fn read_into(&mut self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let range = self.range(offset, dst.len())?;
        dst.copy_from_slice(&self.0[range]);
        Ok(())
    }

    fn write_from(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let range = self.range(offset, src.len())?;
        self.0[range].copy_from_slice(src);
        Ok(())
    }
}

// =============================================================================
// REQUESTS & COMPLETIONS
// =============================================================================

/// Transfer direction, seen from the near side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDir {
    /// Far memory into the buffer.
    Fetch,
    /// Buffer out to far memory.
    Commit,
}

struct Request {
    dir: DmaDir,
    offset: usize,
    len: usize,
    buf: TileBuf,
}

/// A finished transfer, handing the buffer back.
#[derive(Debug)]
pub struct Completion {
    /// Direction of the transfer.
    pub dir: DmaDir,
    /// Far-side offset.
    pub offset: usize,
    /// Bytes moved.
    pub len: usize,
    /// The buffer, owned by the caller again.
    pub buf: TileBuf,
    status: Result<()>,
}

/// Per-channel transfer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmaStats {
    /// Bytes fetched from far memory.
    pub fetched: u64,
    /// Bytes committed to far memory.
    pub committed: u64,
    /// Blocking waits performed.
    pub waits: u64,
}

// =============================================================================
// CHANNEL
// =============================================================================

/// Handle to a running DMA engine bound to a thread scope.
///
/// Dropping the handle closes the request queue; the engine thread finishes
/// its backlog and exits before the scope returns.
pub struct DmaChannel<'scope> {
    requests: Option<Sender<Request>>,
    completions: Receiver<Completion>,
    stash: VecDeque<Completion>,
    in_flight: usize,
    stats: DmaStats,
    _scope: PhantomData<&'scope ()>,
}

impl<'scope> DmaChannel<'scope> {
    /// Start an engine thread on `scope` that owns `mem`.
    ///
    /// # Errors
    /// Returns a DMA fault if the engine thread cannot be spawned.
    pub fn spawn<'env, M>(scope: &'scope Scope<'scope, 'env>, name: &str, mem: M) -> Result<Self>
    where
        M: Memory + 'scope,
    {
        let (req_tx, req_rx) = mpsc::channel::<Request>();
        let (done_tx, done_rx) = mpsc::channel::<Completion>();

        thread::Builder::new()
            .name(format!("dma-{name}"))
            .spawn_scoped(scope, move || serve(mem, &req_rx, &done_tx))
            .map_err(|e| OffloadError::dma(format!("cannot start {name} engine: {e}")))?;

        Ok(Self {
            requests: Some(req_tx),
            completions: done_rx,
            stash: VecDeque::new(),
            in_flight: 0,
            stats: DmaStats::default(),
            _scope: PhantomData,
        })
    }

    /// Queue a transfer of `len` bytes between `buf` and far offset `offset`.
    ///
    /// # Errors
    /// Fails if `len` exceeds the buffer or the engine has gone away.
    pub fn issue(&mut self, dir: DmaDir, offset: usize, len: usize, buf: TileBuf) -> Result<()> {
        if len > buf.capacity() {
            return Err(OffloadError::dma(format!(
                "transfer of {len} bytes into {} byte buffer",
                buf.capacity()
            )));
        }
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| OffloadError::dma("channel closed"))?;
        trace!(?dir, offset, len, "dma issue");
        requests
            .send(Request {
                dir,
                offset,
                len,
                buf,
            })
            .map_err(|_| OffloadError::dma("engine stopped"))?;
        self.in_flight += 1;
        Ok(())
    }

    /// Block until the oldest outstanding transfer in `dir` completes.
    ///
    /// # Errors
    /// Propagates the transfer's fault, or fails if nothing is outstanding in
    /// that direction.
    pub fn wait(&mut self, dir: DmaDir) -> Result<Completion> {
        self.stats.waits += 1;

        if let Some(pos) = self.stash.iter().position(|c| c.dir == dir) {
            if let Some(done) = self.stash.remove(pos) {
                return self.settle(done);
            }
        }

        while self.in_flight > 0 {
            let done = self
                .completions
                .recv()
                .map_err(|_| OffloadError::dma("engine hung up"))?;
            self.in_flight -= 1;
            if done.dir == dir {
                return self.settle(done);
            }
            self.stash.push_back(done);
        }

        Err(OffloadError::dma(format!("wait for {dir:?} with nothing pending")))
    }

    /// Take the oldest finished transfer in `dir` without blocking.
    ///
    /// Returns `Ok(None)` while that transfer is still running.
    ///
    /// # Errors
    /// Propagates the transfer's fault, or fails if the engine went away.
    pub fn poll(&mut self, dir: DmaDir) -> Result<Option<Completion>> {
        if let Some(pos) = self.stash.iter().position(|c| c.dir == dir) {
            if let Some(done) = self.stash.remove(pos) {
                return self.settle(done).map(Some);
            }
        }

        while self.in_flight > 0 {
            let done = match self.completions.try_recv() {
                Ok(done) => done,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    return Err(OffloadError::dma("engine hung up"));
                }
            };
            self.in_flight -= 1;
            if done.dir == dir {
                return self.settle(done).map(Some);
            }
            self.stash.push_back(done);
        }
        Ok(None)
    }

    /// Transfers issued but not yet returned by `wait` or `poll`.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight + self.stash.len()
    }

    /// Statistics since the channel started.
    #[must_use]
    pub const fn stats(&self) -> DmaStats {
        self.stats
    }

    fn settle(&mut self, done: Completion) -> Result<Completion> {
        let Completion {
            dir,
            offset,
            len,
            buf,
            status,
        } = done;
        if let Err(cause) = status {
            return Err(OffloadError::dma_caused_by(
                format!("{dir:?} of {len} bytes at {offset:#x} failed"),
                cause,
            ));
        }
        match dir {
            DmaDir::Fetch => self.stats.fetched += len as u64,
            DmaDir::Commit => self.stats.committed += len as u64,
        }
        Ok(Completion {
            dir,
            offset,
            len,
            buf,
            status: Ok(()),
        })
    }
}

impl Drop for DmaChannel<'_> {
    fn drop(&mut self) {
        self.requests.take();
    }
}

/// Engine loop: serve requests in order until the queue closes.
fn serve<M: Memory>(mut mem: M, requests: &Receiver<Request>, done: &Sender<Completion>) {
    while let Ok(Request {
        dir,
        offset,
        len,
        mut buf,
    }) = requests.recv()
    {
        let status = match dir {
            DmaDir::Fetch => mem.read_into(offset, &mut buf.as_mut_slice()[..len]),
            DmaDir::Commit => mem.write_from(offset, &buf.as_slice()[..len]),
        };
        let completion = Completion {
            dir,
            offset,
            len,
            buf,
            status,
        };
        if done.send(completion).is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fetch_then_commit_moves_bytes() {
        let mut l2: Vec<u8> = (0..=255).collect();
        thread::scope(|s| {
            let mut dma = DmaChannel::spawn(s, "test", L2Window::new(&mut l2)).unwrap();
            dma.issue(DmaDir::Fetch, 16, 8, TileBuf::new(0, 64)).unwrap();
            let mut done = dma.wait(DmaDir::Fetch).unwrap();
            assert_eq!(&done.buf.as_slice()[..8], &[16, 17, 18, 19, 20, 21, 22, 23]);

            done.buf.as_mut_slice()[..8].fill(0xEE);
            dma.issue(DmaDir::Commit, 100, 8, done.buf).unwrap();
            dma.wait(DmaDir::Commit).unwrap();
            assert_eq!(dma.stats().fetched, 8);
            assert_eq!(dma.stats().committed, 8);
        });
        assert_eq!(&l2[100..108], &[0xEE; 8]);
        assert_eq!(l2[99], 99);
    }

    #[test]
    fn waiting_for_one_direction_stashes_the_other() {
        let mut l2 = vec![7u8; 256];
        thread::scope(|s| {
            let mut dma = DmaChannel::spawn(s, "test", L2Window::new(&mut l2)).unwrap();
            dma.issue(DmaDir::Commit, 0, 4, TileBuf::new(0, 64)).unwrap();
            dma.issue(DmaDir::Fetch, 64, 4, TileBuf::new(64, 64)).unwrap();

            let fetched = dma.wait(DmaDir::Fetch).unwrap();
            assert_eq!(fetched.buf.addr(), 64);
            assert_eq!(dma.pending(), 1);

            let committed = dma.wait(DmaDir::Commit).unwrap();
            assert_eq!(committed.buf.addr(), 0);
            assert_eq!(dma.pending(), 0);
        });
    }

    #[test]
    fn poll_returns_finished_transfers_only() {
        let mut l2 = vec![3u8; 128];
        thread::scope(|s| {
            let mut dma = DmaChannel::spawn(s, "test", L2Window::new(&mut l2)).unwrap();
            assert!(dma.poll(DmaDir::Fetch).unwrap().is_none());

            dma.issue(DmaDir::Commit, 0, 4, TileBuf::new(0, 64)).unwrap();
            dma.issue(DmaDir::Fetch, 64, 4, TileBuf::new(64, 64)).unwrap();
            let fetched = loop {
                if let Some(done) = dma.poll(DmaDir::Fetch).unwrap() {
                    break done;
                }
                thread::yield_now();
            };
            assert_eq!(&fetched.buf.as_slice()[..4], &[3; 4]);

            assert!(dma.poll(DmaDir::Commit).unwrap().is_some());
            assert_eq!(dma.pending(), 0);
            assert_eq!(dma.stats().waits, 0);
        });
    }

    #[test]
    fn out_of_range_is_a_fault() {
        let mut l2 = vec![0u8; 32];
        thread::scope(|s| {
            let mut dma = DmaChannel::spawn(s, "test", L2Window::new(&mut l2)).unwrap();
            dma.issue(DmaDir::Fetch, 16, 32, TileBuf::new(0, 64)).unwrap();
            assert!(matches!(
                dma.wait(DmaDir::Fetch),
                Err(OffloadError::Dma { .. })
            ));
        });
    }

    #[test]
    fn ram_fault_is_kept_as_the_source() {
        use crate::platform::ram::{RamConf, RamDevice, RamWindow};

        let ram = RamDevice::open(&RamConf { size: 256 }).unwrap();
        let region = ram.alloc(32).unwrap();
        thread::scope(|s| {
            let mut dma = DmaChannel::spawn(s, "ram", RamWindow::new(&ram, region)).unwrap();
            dma.issue(DmaDir::Fetch, 16, 32, TileBuf::new(0, 64)).unwrap();
            match dma.wait(DmaDir::Fetch) {
                Err(OffloadError::Dma {
                    source: Some(cause),
                    ..
                }) => assert!(matches!(
                    *cause,
                    OffloadError::RamOutOfBounds {
                        offset: 16,
                        len: 32,
                        limit: 32
                    }
                )),
                other => panic!("expected a DMA fault with a RAM cause, got {other:?}"),
            }
            assert_eq!(dma.stats().fetched, 0);
        });
    }

    #[test]
    fn oversized_request_is_rejected_at_issue() {
        let mut l2 = vec![0u8; 256];
        thread::scope(|s| {
            let mut dma = DmaChannel::spawn(s, "test", L2Window::new(&mut l2)).unwrap();
            assert!(dma.issue(DmaDir::Fetch, 0, 65, TileBuf::new(0, 64)).is_err());
            assert!(dma.wait(DmaDir::Fetch).is_err());
        });
    }
}
