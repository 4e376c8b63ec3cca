//! libcurl-backed transport.
//!
//! Each call builds a fresh easy handle. Header lines are collected and reset
//! on every `HTTP/` status line so redirects leave only the final response's
//! headers. A progress callback polls the close flag; closing the client from
//! another thread aborts the in-flight transfer with a transport error.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RangeRequestError, Result};

use super::{HttpBackend, HttpClient, HttpRequest, HttpResponse};

/// Default backend: libcurl with redirect following and stall detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurlBackend;

impl CurlBackend {
    pub fn new() -> Self {
        Self
    }
}

impl HttpBackend for CurlBackend {
    fn create_client(&self) -> Arc<dyn HttpClient> {
        Arc::new(CurlClient {
            closed: AtomicBool::new(false),
        })
    }

    fn head(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(invalid_url)?;
        easy.nobody(true).map_err(curl_setup)?;
        easy.follow_location(true).map_err(curl_setup)?;
        easy.max_redirections(10).map_err(curl_setup)?;
        easy.connect_timeout(timeout).map_err(curl_setup)?;
        easy.timeout(timeout).map_err(curl_setup)?;
        apply_headers(&mut easy, headers)?;

        let lines = RefCell::new(Vec::new());
        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    collect_header_line(&lines, data);
                    true
                })
                .map_err(curl_setup)?;
            transfer.perform().map_err(map_transfer_error)?;
        }

        let status = easy.response_code().map_err(map_transfer_error)?;
        Ok(HttpResponse {
            status,
            header_lines: lines.into_inner(),
        })
    }
}

/// One-request client; `close()` flips a flag polled by the progress callback.
struct CurlClient {
    closed: AtomicBool,
}

impl HttpClient for CurlClient {
    fn get(
        &self,
        req: &HttpRequest,
        on_body: &mut dyn FnMut(u32, &[u8]) -> bool,
    ) -> Result<HttpResponse> {
        if self.is_closed() {
            return Err(RangeRequestError::network("client is closed"));
        }

        let mut easy = curl::easy::Easy::new();
        easy.url(&req.url).map_err(invalid_url)?;
        easy.get(true).map_err(curl_setup)?;
        easy.follow_location(true).map_err(curl_setup)?;
        easy.max_redirections(10).map_err(curl_setup)?;
        easy.connect_timeout(req.timeout).map_err(curl_setup)?;
        // Stall guard in place of a hard wall-clock cap: abort when the
        // transfer moves no bytes for the configured timeout.
        easy.low_speed_limit(1).map_err(curl_setup)?;
        easy.low_speed_time(req.timeout).map_err(curl_setup)?;
        easy.progress(true).map_err(curl_setup)?;
        if let Some((start, end)) = req.range {
            easy.range(&format!("{}-{}", start, end)).map_err(curl_setup)?;
        }
        apply_headers(&mut easy, &req.headers)?;

        let status = Cell::new(0u32);
        let lines = RefCell::new(Vec::new());
        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    if let Some(code) = collect_header_line(&lines, data) {
                        status.set(code);
                    }
                    true
                })
                .map_err(curl_setup)?;
            transfer
                .write_function(|data| {
                    if on_body(status.get(), data) {
                        Ok(data.len())
                    } else {
                        // Zero consumed bytes makes libcurl abort the transfer.
                        Ok(0)
                    }
                })
                .map_err(curl_setup)?;
            transfer
                .progress_function(|_, _, _, _| !self.closed.load(Ordering::SeqCst))
                .map_err(curl_setup)?;
            transfer.perform().map_err(map_transfer_error)?;
        }

        let status = easy.response_code().map_err(map_transfer_error)?;
        Ok(HttpResponse {
            status,
            header_lines: lines.into_inner(),
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Append one raw header line; on a new `HTTP/` status line, drop lines from
/// any previous (redirect) response and return the parsed status code.
fn collect_header_line(lines: &RefCell<Vec<String>>, data: &[u8]) -> Option<u32> {
    let line = str::from_utf8(data).ok()?.trim_end();
    let mut code = None;
    if line.starts_with("HTTP/") {
        lines.borrow_mut().clear();
        code = line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u32>().ok());
    }
    if !line.is_empty() {
        lines.borrow_mut().push(line.to_string());
    }
    code
}

fn apply_headers(
    easy: &mut curl::easy::Easy,
    headers: &HashMap<String, String>,
) -> Result<()> {
    if headers.is_empty() {
        return Ok(());
    }
    let mut list = curl::easy::List::new();
    for (name, value) in headers {
        list.append(&format!("{}: {}", name.trim(), value.trim()))
            .map_err(curl_setup)?;
    }
    easy.http_headers(list).map_err(curl_setup)
}

fn invalid_url(e: curl::Error) -> RangeRequestError {
    RangeRequestError::network(format!("invalid URL: {}", e))
}

fn curl_setup(e: curl::Error) -> RangeRequestError {
    RangeRequestError::network(format!("curl setup failed: {}", e))
}

fn map_transfer_error(e: curl::Error) -> RangeRequestError {
    if e.is_operation_timedout() {
        RangeRequestError::network(format!("request timed out: {}", e))
    } else if e.is_aborted_by_callback() {
        RangeRequestError::network("transfer aborted: client closed")
    } else if e.is_write_error() {
        RangeRequestError::network("transfer aborted by body consumer")
    } else {
        RangeRequestError::network(format!("transport error: {}", e))
    }
}
