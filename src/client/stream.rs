//! Lazy ordered byte stream over a fetch.
//!
//! Nothing touches the network until the first pull. The stream probes the
//! server when capabilities were not supplied, picks the parallel or serial
//! strategy, and then pumps the scheduler (or the serial worker's channel)
//! from the caller's thread. A timer thread drives the periodic progress
//! callback and is stopped on every exit path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::RangeRequestConfig;
use crate::control::CancelToken;
use crate::error::Result;
use crate::http::HttpBackend;
use crate::probe;
use crate::scheduler::{plan_ranges, ChunkScheduler, FetchContext};

use super::serial;
use super::{FetchOptions, ProgressFn};

enum StreamState {
    Pending,
    Parallel(ChunkScheduler),
    Serial {
        rx: mpsc::Receiver<Result<Vec<u8>>>,
        worker: Option<JoinHandle<()>>,
    },
    Finished,
}

/// Finite, non-restartable sequence of in-order chunks from one fetch.
pub struct ChunkStream {
    backend: Arc<dyn HttpBackend>,
    config: RangeRequestConfig,
    url: String,
    content_length: Option<u64>,
    accept_ranges: Option<bool>,
    start_bytes: u64,
    token: CancelToken,
    on_progress: Option<Arc<ProgressFn>>,
    received: Arc<AtomicU64>,
    total: u64,
    timer: Option<ProgressTimer>,
    ready: VecDeque<Vec<u8>>,
    state: StreamState,
}

impl ChunkStream {
    pub(crate) fn new(
        backend: Arc<dyn HttpBackend>,
        config: RangeRequestConfig,
        url: String,
        options: FetchOptions,
        token: CancelToken,
    ) -> Self {
        Self {
            backend,
            config,
            url,
            content_length: options.content_length,
            accept_ranges: options.accept_ranges,
            start_bytes: options.start_bytes,
            token,
            on_progress: options.on_progress,
            received: Arc::new(AtomicU64::new(options.start_bytes)),
            total: 0,
            timer: None,
            ready: VecDeque::new(),
            state: StreamState::Pending,
        }
    }

    /// The cancel signal driving this fetch.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.token
    }

    /// Bytes observed so far, including the resume offset.
    pub fn received_bytes(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    fn start(&mut self) -> Result<()> {
        self.token.throw_if_cancelled()?;
        let (total, accept_ranges) = match (self.content_length, self.accept_ranges) {
            (Some(len), Some(ranges)) => (len, ranges),
            _ => {
                let info = probe::check(
                    self.backend.as_ref(),
                    &self.url,
                    &self.config.headers,
                    self.config.connection_timeout(),
                    self.config.relaxed_accept_ranges,
                )?;
                (info.content_length, info.accept_ranges)
            }
        };
        self.total = total;

        if let Some(on_progress) = &self.on_progress {
            self.timer = Some(ProgressTimer::start(
                self.config.progress_interval(),
                Arc::clone(&self.received),
                total,
                Arc::clone(on_progress),
            ));
        }

        let ctx = Arc::new(FetchContext {
            backend: Arc::clone(&self.backend),
            url: self.url.clone(),
            headers: self.config.headers.clone(),
            timeout: self.config.connection_timeout(),
            token: self.token.clone(),
            max_retries: self.config.max_retries,
            retry_delay: self.config.retry_delay(),
        });

        if accept_ranges {
            let ranges = plan_ranges(total, self.config.chunk_size, self.start_bytes);
            tracing::debug!(url = %self.url, ranges = ranges.len(), "starting parallel range fetch");
            let mut scheduler =
                ChunkScheduler::new(ctx, ranges, self.config.max_concurrent_requests);
            scheduler.start_initial_fetches()?;
            self.state = StreamState::Parallel(scheduler);
        } else {
            tracing::debug!(url = %self.url, "server does not accept ranges, fetching serially");
            let (tx, rx) = mpsc::channel();
            let worker = std::thread::spawn(move || serial::run(ctx, tx));
            self.state = StreamState::Serial {
                rx,
                worker: Some(worker),
            };
        }
        Ok(())
    }

    /// Produce the next in-order chunk, or `None` when the body is complete.
    fn pump(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if matches!(self.state, StreamState::Pending) {
                self.start()?;
            }
            if let Some(chunk) = self.ready.pop_front() {
                return Ok(Some(chunk));
            }
            match &mut self.state {
                StreamState::Parallel(scheduler) => {
                    let chunks = scheduler.yield_ready_chunks();
                    if !chunks.is_empty() {
                        self.ready.extend(chunks);
                        continue;
                    }
                    if !scheduler.has_more() {
                        return Ok(None);
                    }
                    scheduler.process_next_completion()?;
                }
                StreamState::Serial { rx, .. } => match rx.recv() {
                    Ok(Ok(chunk)) => return Ok(Some(chunk)),
                    Ok(Err(e)) => return Err(e),
                    // Sender dropped without an error: body complete.
                    Err(_) => return Ok(None),
                },
                StreamState::Pending | StreamState::Finished => return Ok(None),
            }
        }
    }

    fn stop_timer(&mut self) {
        self.timer.take();
    }

    fn join_serial_worker(&mut self) {
        if let StreamState::Serial { worker, .. } = &mut self.state {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Iterator for ChunkStream {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, StreamState::Finished) {
            return None;
        }
        match self.pump() {
            Ok(Some(chunk)) => {
                self.received.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                Some(Ok(chunk))
            }
            Ok(None) => {
                self.stop_timer();
                self.join_serial_worker();
                self.state = StreamState::Finished;
                if let Some(on_progress) = &self.on_progress {
                    on_progress(self.received.load(Ordering::Relaxed), self.total);
                }
                None
            }
            Err(e) => {
                self.stop_timer();
                self.join_serial_worker();
                self.state = StreamState::Finished;
                self.ready.clear();
                Some(Err(e))
            }
        }
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        // Abandoning the stream must not leave the timer thread ticking.
        self.stop_timer();
    }
}

/// Thread invoking the progress callback every interval while bytes have been
/// received. Stopping (or dropping) wakes and joins the thread immediately.
struct ProgressTimer {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTimer {
    fn start(
        interval: Duration,
        received: Arc<AtomicU64>,
        total: u64,
        on_progress: Arc<ProgressFn>,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let bytes = received.load(Ordering::Relaxed);
                    if bytes > 0 {
                        on_progress(bytes, total);
                    }
                }
                _ => break,
            }
        });
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }
}

impl Drop for ProgressTimer {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
