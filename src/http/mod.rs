//! HTTP transport abstraction.
//!
//! Two operations: a factory for short-lived clients (one per request, so a
//! cancel signal can close the one serving an in-flight transfer) and a
//! self-contained HEAD. The default implementation wraps libcurl; tests
//! substitute a deterministic mock at this seam.

mod curl_backend;

#[cfg(test)]
pub(crate) mod testing;

pub use curl_backend::CurlBackend;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// One HTTP request. `range` bounds are inclusive and rendered as
/// `Range: bytes=<start>-<end>` on the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub range: Option<(u64, u64)>,
    pub timeout: Duration,
}

/// Status and raw header lines of a completed request. Header lines belong to
/// the final response when redirects were followed.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u32,
    pub header_lines: Vec<String>,
}

impl HttpResponse {
    /// Value of the first header with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_lines.iter().find_map(|line| {
            let (n, v) = line.split_once(':')?;
            if n.trim().eq_ignore_ascii_case(name) {
                Some(v.trim())
            } else {
                None
            }
        })
    }
}

/// A single-use HTTP client whose in-flight transfer can be aborted from
/// another thread by `close()`.
pub trait HttpClient: Send + Sync {
    /// Perform a blocking GET. `on_body` receives the response status and each
    /// body chunk as it arrives; returning `false` aborts the transfer.
    fn get(
        &self,
        req: &HttpRequest,
        on_body: &mut dyn FnMut(u32, &[u8]) -> bool,
    ) -> Result<HttpResponse>;

    /// Abort any in-flight transfer and poison the client. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Factory for clients plus a one-shot HEAD using an ephemeral client.
pub trait HttpBackend: Send + Sync {
    fn create_client(&self) -> Arc<dyn HttpClient>;

    /// Issue a HEAD request and return the status plus header lines. Does not
    /// judge the status; callers decide what is acceptable.
    fn head(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<HttpResponse>;
}
