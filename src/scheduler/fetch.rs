//! One range GET with per-range retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::control::CancelToken;
use crate::error::{RangeRequestError, Result};
use crate::http::{HttpBackend, HttpClient, HttpRequest};
use crate::retry::RetryPolicy;

use super::ChunkRange;

/// Everything a range worker needs; shared across the workers of one fetch.
pub(crate) struct FetchContext {
    pub backend: Arc<dyn HttpBackend>,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    pub token: CancelToken,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Download one range, retrying per the context's budget. Cancellation is
/// checked before every attempt, so a transport error caused by a closed
/// client surfaces as `cancelled` on the next turn of the loop.
pub(crate) fn fetch_range(ctx: &FetchContext, range: ChunkRange) -> Result<Vec<u8>> {
    let mut retry = RetryPolicy::new(ctx.max_retries, ctx.retry_delay);
    loop {
        ctx.token.throw_if_cancelled()?;
        match fetch_range_once(ctx, range) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                tracing::debug!(
                    start = range.start,
                    end = range.end,
                    attempts = retry.attempts() + 1,
                    error = %e,
                    "range attempt failed"
                );
                if !retry.handle_error() {
                    tracing::warn!(start = range.start, end = range.end, error = %e, "range failed, retries exhausted");
                    return Err(e);
                }
            }
        }
    }
}

/// One attempt: fresh client, registered with the cancel signal for the
/// duration of the request, unregistered and closed on every exit path.
fn fetch_range_once(ctx: &FetchContext, range: ChunkRange) -> Result<Vec<u8>> {
    let client = ctx.backend.create_client();
    ctx.token.register_client(Arc::clone(&client));
    let result = range_get(client.as_ref(), ctx, range);
    ctx.token.unregister_client();
    client.close();
    result
}

fn range_get(client: &dyn HttpClient, ctx: &FetchContext, range: ChunkRange) -> Result<Vec<u8>> {
    let req = HttpRequest {
        url: ctx.url.clone(),
        headers: ctx.headers.clone(),
        range: Some((range.start, range.end)),
        timeout: ctx.timeout,
    };
    let mut body: Vec<u8> = Vec::with_capacity(range.len() as usize);
    let resp = client.get(&req, &mut |status, data| {
        if status == 206 {
            body.extend_from_slice(data);
        }
        true
    })?;
    if resp.status != 206 {
        return Err(RangeRequestError::invalid_response(format!(
            "Expected 206 Partial Content, got HTTP {}",
            resp.status
        )));
    }
    if body.len() as u64 != range.len() {
        return Err(RangeRequestError::invalid_response(format!(
            "range {}-{} returned {} bytes, expected {}",
            range.start,
            range.end,
            body.len(),
            range.len()
        )));
    }
    Ok(body)
}
