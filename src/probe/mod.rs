//! Server capability probe.
//!
//! One HEAD request per fetch answers three questions: how long is the
//! resource, does the server accept byte ranges, and does it suggest a
//! filename.

mod parse;

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{RangeRequestError, Result};
use crate::http::HttpBackend;

/// What a HEAD request revealed about the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// True when the server advertises byte-range support.
    pub accept_ranges: bool,
    /// Total size of the resource in bytes.
    pub content_length: u64,
    /// Filename suggested via `Content-Disposition`, if any.
    pub file_name: Option<String>,
}

/// Issue a HEAD request and parse the capability headers.
///
/// `relaxed_accept_ranges` switches the `Accept-Ranges` comparison to ASCII
/// case-insensitive; the stock behavior treats only the literal `none` as
/// unsupported.
pub(crate) fn check(
    backend: &dyn HttpBackend,
    url: &str,
    headers: &HashMap<String, String>,
    timeout: Duration,
    relaxed_accept_ranges: bool,
) -> Result<ServerInfo> {
    let resp = backend.head(url, headers, timeout)?;
    if resp.status != 200 {
        return Err(RangeRequestError::server(format!(
            "HEAD request for {} returned HTTP {}",
            url, resp.status
        )));
    }
    let info = parse::server_info_from_headers(&resp.header_lines, relaxed_accept_ranges)?;
    tracing::debug!(
        url,
        content_length = info.content_length,
        accept_ranges = info.accept_ranges,
        "probed server capabilities"
    );
    Ok(info)
}
