//! Whole-body fallback for servers without range support.
//!
//! Runs on a worker thread feeding the stream's channel. Any failure restarts
//! the entire download from byte 0; a non-200 status is detected before any
//! body byte is forwarded downstream.

use std::sync::mpsc;
use std::sync::Arc;

use crate::error::{RangeRequestError, Result};
use crate::http::HttpRequest;
use crate::retry::RetryPolicy;
use crate::scheduler::FetchContext;

pub(crate) fn run(ctx: Arc<FetchContext>, tx: mpsc::Sender<Result<Vec<u8>>>) {
    if let Err(e) = fetch_serial(&ctx, &tx) {
        let _ = tx.send(Err(e));
    }
    // Dropping the sender tells the stream the body is complete.
}

fn fetch_serial(ctx: &FetchContext, tx: &mpsc::Sender<Result<Vec<u8>>>) -> Result<()> {
    let mut retry = RetryPolicy::new(ctx.max_retries, ctx.retry_delay);
    loop {
        ctx.token.throw_if_cancelled()?;
        match attempt(ctx, tx) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::debug!(
                    url = %ctx.url,
                    attempts = retry.attempts() + 1,
                    error = %e,
                    "whole-body attempt failed"
                );
                if !retry.handle_error() {
                    return Err(e);
                }
            }
        }
    }
}

fn attempt(ctx: &FetchContext, tx: &mpsc::Sender<Result<Vec<u8>>>) -> Result<()> {
    let client = ctx.backend.create_client();
    ctx.token.register_client(Arc::clone(&client));
    let mut bad_status: Option<u32> = None;
    let result = {
        let req = HttpRequest {
            url: ctx.url.clone(),
            headers: ctx.headers.clone(),
            range: None,
            timeout: ctx.timeout,
        };
        client.get(&req, &mut |status, data| {
            if status != 200 {
                bad_status = Some(status);
                return false;
            }
            tx.send(Ok(data.to_vec())).is_ok()
        })
    };
    ctx.token.unregister_client();
    client.close();

    if let Some(code) = bad_status {
        return Err(RangeRequestError::server(format!(
            "GET returned HTTP {}",
            code
        )));
    }
    let resp = result?;
    if resp.status != 200 {
        return Err(RangeRequestError::server(format!(
            "GET returned HTTP {}",
            resp.status
        )));
    }
    Ok(())
}
