//! Range planning and the chunk scheduler.
//!
//! The scheduler turns a byte span into fixed-size ranges, keeps up to the
//! configured number of range GETs in flight on worker threads, buffers
//! out-of-order completions, and emits chunks in strict range order. It is
//! created per fetch and consumed exactly once.

mod fetch;

pub(crate) use fetch::FetchContext;

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{RangeRequestError, Result};

/// One planned byte range, both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    /// Number of bytes this range covers. Never zero: both bounds are
    /// inclusive.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Split `[offset, total)` into ranges of `chunk_size` bytes; the last range
/// may be shorter. Empty when `offset >= total` (which covers a zero total).
pub fn plan_ranges(total: u64, chunk_size: u64, offset: u64) -> Vec<ChunkRange> {
    if chunk_size == 0 || offset >= total {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = offset;
    while start < total {
        let end = start.saturating_add(chunk_size - 1).min(total - 1);
        out.push(ChunkRange { start, end });
        start = end + 1;
    }
    out
}

type Completion = (usize, Result<Vec<u8>>);

/// Per-fetch state machine: plans, dispatches, awaits, and emits chunks.
pub(crate) struct ChunkScheduler {
    ctx: Arc<FetchContext>,
    ranges: Vec<ChunkRange>,
    max_concurrent: usize,
    /// Next range to hand to a worker.
    next_chunk_index: usize,
    /// Next range to emit; emission is gap-free and strictly increasing.
    next_write_index: usize,
    active_tasks: HashMap<usize, JoinHandle<()>>,
    pending_chunks: HashMap<usize, Vec<u8>>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    on_chunk: Option<Box<dyn Fn(u64) + Send>>,
}

impl ChunkScheduler {
    pub(crate) fn new(ctx: Arc<FetchContext>, ranges: Vec<ChunkRange>, max_concurrent: usize) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();
        Self {
            ctx,
            ranges,
            max_concurrent: max_concurrent.max(1),
            next_chunk_index: 0,
            next_write_index: 0,
            active_tasks: HashMap::new(),
            pending_chunks: HashMap::new(),
            completion_tx,
            completion_rx,
            on_chunk: None,
        }
    }

    /// Hook invoked with the byte count of every completed range.
    pub(crate) fn set_progress_hook(&mut self, hook: impl Fn(u64) + Send + 'static) {
        self.on_chunk = Some(Box::new(hook));
    }

    /// Fill the dispatch window up to the concurrency cap. Cancellation is
    /// checked before each dispatch; a pre-cancelled token raises before any
    /// task is created.
    pub(crate) fn start_initial_fetches(&mut self) -> Result<()> {
        while self.active_tasks.len() < self.max_concurrent
            && self.next_chunk_index < self.ranges.len()
        {
            self.ctx.token.throw_if_cancelled()?;
            self.dispatch_next();
        }
        Ok(())
    }

    /// Await the first in-flight range to finish, buffer its bytes, and (when
    /// not cancelled and ranges remain) dispatch the next one. A range error
    /// propagates after its retries are exhausted.
    pub(crate) fn process_next_completion(&mut self) -> Result<()> {
        self.ctx.token.throw_if_cancelled()?;
        let (index, result) = self.completion_rx.recv().map_err(|_| {
            RangeRequestError::network("range worker channel closed unexpectedly")
        })?;
        if let Some(handle) = self.active_tasks.remove(&index) {
            let _ = handle.join();
        }
        let bytes = result?;
        if let Some(hook) = &self.on_chunk {
            hook(bytes.len() as u64);
        }
        self.pending_chunks.insert(index, bytes);
        if !self.ctx.token.is_cancelled() && self.next_chunk_index < self.ranges.len() {
            self.dispatch_next();
        }
        Ok(())
    }

    /// Drain every buffered chunk that is next in line. Never blocks.
    pub(crate) fn yield_ready_chunks(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(bytes) = self.pending_chunks.remove(&self.next_write_index) {
            out.push(bytes);
            self.next_write_index += 1;
        }
        out
    }

    /// True while anything is in flight or buffered.
    pub(crate) fn has_more(&self) -> bool {
        !self.active_tasks.is_empty() || !self.pending_chunks.is_empty()
    }

    fn dispatch_next(&mut self) {
        let index = self.next_chunk_index;
        let range = self.ranges[index];
        let ctx = Arc::clone(&self.ctx);
        let tx = self.completion_tx.clone();
        tracing::debug!(index, start = range.start, end = range.end, "dispatching range");
        let handle = std::thread::spawn(move || {
            let result = fetch::fetch_range(&ctx, range);
            // The receiver may already be gone when the fetch was abandoned.
            let _ = tx.send((index, result));
        });
        self.active_tasks.insert(index, handle);
        self.next_chunk_index += 1;
    }
}
