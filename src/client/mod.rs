//! Public fetch entry point.
//!
//! A `RangeRequestClient` owns a configuration, a transport backend, and the
//! group of cancel tokens for its active fetches. `fetch` returns a lazy
//! ordered byte stream; strategy selection (parallel ranges vs whole-body
//! serial) happens on the first pull.

mod serial;
mod stream;

pub use stream::ChunkStream;

use std::sync::Arc;

use crate::config::RangeRequestConfig;
use crate::control::{CancelToken, CancelTokenGroup};
use crate::error::Result;
use crate::http::{CurlBackend, HttpBackend};
use crate::probe::{self, ServerInfo};

/// Progress callback: `(bytes received so far, total bytes)`.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Options for [`RangeRequestClient::fetch`].
#[derive(Default)]
pub struct FetchOptions {
    /// Known total size; together with `accept_ranges` this skips the HEAD.
    pub content_length: Option<u64>,
    /// Known range support; together with `content_length` this skips the HEAD.
    pub accept_ranges: Option<bool>,
    /// Resume offset: first byte to request.
    pub start_bytes: u64,
    /// Caller-supplied cancel signal; one is created when absent.
    pub cancel_token: Option<CancelToken>,
    /// Periodic and final progress callback.
    pub on_progress: Option<Arc<ProgressFn>>,
}

/// Downloads a single HTTP resource with concurrent range requests.
pub struct RangeRequestClient {
    config: RangeRequestConfig,
    backend: Arc<dyn HttpBackend>,
    tokens: CancelTokenGroup,
}

impl RangeRequestClient {
    /// Client with default configuration over the libcurl backend.
    pub fn new() -> Self {
        Self::with_config(RangeRequestConfig::default())
    }

    pub fn with_config(config: RangeRequestConfig) -> Self {
        Self::with_backend(config, Arc::new(CurlBackend::new()))
    }

    /// Substitute the transport; used by tests and embedders with their own
    /// HTTP stack.
    pub fn with_backend(config: RangeRequestConfig, backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            config,
            backend,
            tokens: CancelTokenGroup::new(),
        }
    }

    pub fn config(&self) -> &RangeRequestConfig {
        &self.config
    }

    /// Probe the server for size, range support, and a filename hint.
    pub fn check_server_info(&self, url: &str) -> Result<ServerInfo> {
        probe::check(
            self.backend.as_ref(),
            url,
            &self.config.headers,
            self.config.connection_timeout(),
            self.config.relaxed_accept_ranges,
        )
    }

    /// Start a fetch and return its lazy ordered byte stream.
    ///
    /// The cancel token is adopted (or created) and tracked immediately so
    /// `cancel_all` affects the fetch even before the first pull; all network
    /// work is deferred to the stream.
    pub fn fetch(&self, url: &str, options: FetchOptions) -> ChunkStream {
        let token = options
            .cancel_token
            .clone()
            .unwrap_or_default();
        self.tokens.add_token(&token);
        ChunkStream::new(
            Arc::clone(&self.backend),
            self.config.clone(),
            url.to_string(),
            options,
            token,
        )
    }

    /// Cancel every fetch started through this client.
    pub fn cancel_all(&self) {
        self.tokens.cancel_all();
    }

    /// Forget all tracked tokens without cancelling them.
    pub fn clear_tokens(&self) {
        self.tokens.clear();
    }

    /// Number of tokens currently tracked.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

impl Default for RangeRequestClient {
    fn default() -> Self {
        Self::new()
    }
}
