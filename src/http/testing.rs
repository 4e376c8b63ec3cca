//! Deterministic in-process HTTP backend for scheduler and client tests.
//!
//! Serves a fixed body, honors range requests, and can be scripted to fail
//! specific ranges with a 500, delay responses, or omit headers. Counters
//! expose attempt totals and the high-watermark of concurrent requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{RangeRequestError, Result};

use super::{HttpBackend, HttpClient, HttpRequest, HttpResponse};

pub(crate) struct MockState {
    pub body: Vec<u8>,
    pub accept_ranges: Option<String>,
    pub content_disposition: Option<String>,
    pub omit_content_length: bool,
    pub head_status: u32,
    pub response_delay: Duration,
    /// range start -> remaining attempts that answer 500.
    pub fail_ranges: Mutex<HashMap<u64, u32>>,
    /// Remaining whole-body GETs that answer 500.
    pub fail_serial: AtomicU32,
    /// Deliver this many bytes fewer than requested for every range.
    pub truncate_by: u64,
    pub get_count: AtomicU32,
    pub head_count: AtomicU32,
    pub concurrent: AtomicUsize,
    pub max_concurrent: AtomicUsize,
}

/// Scripted backend handed to `RangeRequestClient::with_backend` in tests.
#[derive(Clone)]
pub(crate) struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            state: Arc::new(MockState {
                body: body.into(),
                accept_ranges: Some("bytes".to_string()),
                content_disposition: None,
                omit_content_length: false,
                head_status: 200,
                response_delay: Duration::ZERO,
                fail_ranges: Mutex::new(HashMap::new()),
                fail_serial: AtomicU32::new(0),
                truncate_by: 0,
                get_count: AtomicU32::new(0),
                head_count: AtomicU32::new(0),
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
            }),
        }
    }

    fn state_mut(&mut self) -> &mut MockState {
        Arc::get_mut(&mut self.state).expect("configure the mock before cloning it")
    }

    pub fn without_ranges(mut self) -> Self {
        self.state_mut().accept_ranges = None;
        self
    }

    pub fn accept_ranges_value(mut self, value: &str) -> Self {
        self.state_mut().accept_ranges = Some(value.to_string());
        self
    }

    pub fn content_disposition(mut self, value: &str) -> Self {
        self.state_mut().content_disposition = Some(value.to_string());
        self
    }

    pub fn omit_content_length(mut self) -> Self {
        self.state_mut().omit_content_length = true;
        self
    }

    pub fn head_status(mut self, status: u32) -> Self {
        self.state_mut().head_status = status;
        self
    }

    pub fn response_delay(mut self, delay: Duration) -> Self {
        self.state_mut().response_delay = delay;
        self
    }

    /// The range starting at `start` answers 500 for its first `n` attempts.
    pub fn fail_range(self, start: u64, n: u32) -> Self {
        self.state.fail_ranges.lock().unwrap().insert(start, n);
        self
    }

    pub fn truncate_bodies_by(mut self, n: u64) -> Self {
        self.state_mut().truncate_by = n;
        self
    }

    /// The first `n` whole-body GETs answer 500.
    pub fn fail_serial_gets(self, n: u32) -> Self {
        self.state.fail_serial.store(n, Ordering::SeqCst);
        self
    }

    pub fn state(&self) -> &MockState {
        &self.state
    }
}

impl HttpBackend for MockBackend {
    fn create_client(&self) -> Arc<dyn HttpClient> {
        Arc::new(MockClient {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        })
    }

    fn head(
        &self,
        _url: &str,
        _headers: &HashMap<String, String>,
        _timeout: Duration,
    ) -> Result<HttpResponse> {
        let state = &self.state;
        state.head_count.fetch_add(1, Ordering::SeqCst);
        let mut lines = vec![format!("HTTP/1.1 {} X", state.head_status)];
        if !state.omit_content_length {
            lines.push(format!("Content-Length: {}", state.body.len()));
        }
        if let Some(value) = &state.accept_ranges {
            lines.push(format!("Accept-Ranges: {}", value));
        }
        if let Some(value) = &state.content_disposition {
            lines.push(format!("Content-Disposition: {}", value));
        }
        Ok(HttpResponse {
            status: state.head_status,
            header_lines: lines,
        })
    }
}

struct MockClient {
    state: Arc<MockState>,
    closed: AtomicBool,
}

struct ConcurrencyGuard<'a>(&'a MockState);

impl Drop for ConcurrencyGuard<'_> {
    fn drop(&mut self) {
        self.0.concurrent.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockClient {
    /// Sleep in small steps so `close()` interrupts a scripted delay the way
    /// closing a real client interrupts a pending response.
    fn delay_or_abort(&self) -> Result<()> {
        let mut remaining = self.state.response_delay;
        let step = Duration::from_millis(5);
        while !remaining.is_zero() {
            if self.is_closed() {
                return Err(RangeRequestError::network("transfer aborted: client closed"));
            }
            let nap = remaining.min(step);
            std::thread::sleep(nap);
            remaining -= nap;
        }
        Ok(())
    }
}

impl HttpClient for MockClient {
    fn get(
        &self,
        req: &HttpRequest,
        on_body: &mut dyn FnMut(u32, &[u8]) -> bool,
    ) -> Result<HttpResponse> {
        if self.is_closed() {
            return Err(RangeRequestError::network("client is closed"));
        }
        let state = &self.state;
        state.get_count.fetch_add(1, Ordering::SeqCst);
        let now = state.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_concurrent.fetch_max(now, Ordering::SeqCst);
        let _guard = ConcurrencyGuard(state);

        self.delay_or_abort()?;

        match req.range {
            Some((start, end)) => {
                if let Some(remaining) = state.fail_ranges.lock().unwrap().get_mut(&start) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Ok(HttpResponse {
                            status: 500,
                            header_lines: vec!["HTTP/1.1 500 Internal Server Error".to_string()],
                        });
                    }
                }
                let len = state.body.len() as u64;
                let start_i = start.min(len) as usize;
                let end_i = end.saturating_add(1).min(len) as usize;
                let mut slice = &state.body[start_i..end_i.max(start_i)];
                if state.truncate_by > 0 {
                    let keep = slice.len().saturating_sub(state.truncate_by as usize);
                    slice = &slice[..keep];
                }
                if !on_body(206, slice) {
                    return Err(RangeRequestError::network(
                        "transfer aborted by body consumer",
                    ));
                }
                Ok(HttpResponse {
                    status: 206,
                    header_lines: vec![
                        "HTTP/1.1 206 Partial Content".to_string(),
                        format!("Content-Length: {}", slice.len()),
                    ],
                })
            }
            None => {
                if state
                    .fail_serial
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Ok(HttpResponse {
                        status: 500,
                        header_lines: vec!["HTTP/1.1 500 Internal Server Error".to_string()],
                    });
                }
                // Hand the body over in several pieces so consumers exercise
                // their chunk handling.
                for piece in state.body.chunks(7.max(state.body.len() / 4)) {
                    if self.is_closed() {
                        return Err(RangeRequestError::network(
                            "transfer aborted: client closed",
                        ));
                    }
                    if !on_body(200, piece) {
                        return Err(RangeRequestError::network(
                            "transfer aborted by body consumer",
                        ));
                    }
                }
                Ok(HttpResponse {
                    status: 200,
                    header_lines: vec![
                        "HTTP/1.1 200 OK".to_string(),
                        format!("Content-Length: {}", state.body.len()),
                    ],
                })
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
