//! Parse HEAD response header lines into `ServerInfo`.

use crate::error::{RangeRequestError, Result};

use super::ServerInfo;

/// Extract content length, range support, and filename from raw header lines.
///
/// A missing or non-numeric `Content-Length` is an invalid response. Range
/// support means the `Accept-Ranges` header is present and its value is not
/// the literal `none`; the comparison is byte-exact unless `relaxed` is set.
pub(crate) fn server_info_from_headers(lines: &[String], relaxed: bool) -> Result<ServerInfo> {
    let mut content_length: Option<u64> = None;
    let mut accept_ranges = false;
    let mut file_name: Option<String> = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse::<u64>().ok();
            }
            if name.eq_ignore_ascii_case("accept-ranges") {
                accept_ranges = if relaxed {
                    !value.eq_ignore_ascii_case("none")
                } else {
                    value != "none"
                };
            }
            if name.eq_ignore_ascii_case("content-disposition") {
                file_name = filename_param(value);
            }
        }
    }

    let content_length = content_length.ok_or_else(|| {
        RangeRequestError::invalid_response("missing or unparseable Content-Length header")
    })?;

    Ok(ServerInfo {
        accept_ranges,
        content_length,
        file_name,
    })
}

/// Filename from a `Content-Disposition` value: the first `filename=`
/// parameter wins. A double-quoted value is captured without the quotes, an
/// unquoted value is the semicolon-delimited token, trimmed.
fn filename_param(value: &str) -> Option<String> {
    for param in value.split(';') {
        let param = param.trim();
        if let Some((name, v)) = param.split_once('=') {
            if !name.trim().eq_ignore_ascii_case("filename") {
                continue;
            }
            let v = v.trim();
            let captured = if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
                &v[1..v.len() - 1]
            } else {
                v
            };
            if !captured.is_empty() {
                return Some(captured.to_string());
            }
        }
    }
    None
}
