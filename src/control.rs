//! Cooperative cancellation: shared tokens plus a client-close hook.
//!
//! A `CancelToken` carries a one-shot flag and a slot for the HTTP client
//! currently serving the fetch; cancelling closes that client so its in-flight
//! request unblocks with a transport error, which the retry loop then converts
//! to a `cancelled` error at its next check. A `CancelTokenGroup` aggregates
//! the tokens owned by one engine instance for fan-out cancel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{RangeRequestError, Result};
use crate::http::HttpClient;

struct TokenInner {
    cancelled: AtomicBool,
    // Only the most recently registered client is retained; registration and
    // cancellation serialize on this lock so the cancel/register race is safe.
    client: Mutex<Option<Arc<dyn HttpClient>>>,
}

/// Shared one-shot cancellation signal. Clones observe the same state.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                client: Mutex::new(None),
            }),
        }
    }

    /// Set the flag and close the registered client. Idempotent; safe to call
    /// from any thread at any time.
    pub fn cancel(&self) {
        let guard = self.inner.client.lock().unwrap();
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(client) = guard.as_ref() {
            client.close();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Raise `cancelled` when the flag is set.
    pub fn throw_if_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RangeRequestError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Store `client` in the slot, replacing any previous registration. On an
    /// already-cancelled token the client is closed immediately.
    pub fn register_client(&self, client: Arc<dyn HttpClient>) {
        let mut guard = self.inner.client.lock().unwrap();
        if self.inner.cancelled.load(Ordering::SeqCst) {
            client.close();
        }
        *guard = Some(client);
    }

    /// Clear the client slot without closing the client.
    pub fn unregister_client(&self) {
        self.inner.client.lock().unwrap().take();
    }

    fn same_token(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Set of cancel tokens with identity semantics, owned by one client instance.
#[derive(Default)]
pub struct CancelTokenGroup {
    tokens: Mutex<Vec<CancelToken>>,
}

impl CancelTokenGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh token and track it.
    pub fn create_token(&self) -> CancelToken {
        let token = CancelToken::new();
        self.add_token(&token);
        token
    }

    /// Track `token`. A no-op when the same token is already tracked.
    pub fn add_token(&self, token: &CancelToken) {
        let mut tokens = self.tokens.lock().unwrap();
        if !tokens.iter().any(|t| t.same_token(token)) {
            tokens.push(token.clone());
        }
    }

    /// Stop tracking `token` without cancelling it.
    pub fn remove_token(&self, token: &CancelToken) {
        self.tokens.lock().unwrap().retain(|t| !t.same_token(token));
    }

    /// Cancel every token that is not already cancelled.
    pub fn cancel_all(&self) {
        for token in self.tokens.lock().unwrap().iter() {
            if !token.is_cancelled() {
                token.cancel();
            }
        }
    }

    /// Drop all tracked tokens without cancelling them.
    pub fn clear(&self) {
        self.tokens.lock().unwrap().clear();
    }

    pub fn cancel_and_clear(&self) {
        self.cancel_all();
        self.clear();
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_any_cancelled(&self) -> bool {
        self.tokens.lock().unwrap().iter().any(|t| t.is_cancelled())
    }

    /// True when every tracked token is cancelled; vacuously true when empty.
    pub fn are_all_cancelled(&self) -> bool {
        self.tokens.lock().unwrap().iter().all(|t| t.is_cancelled())
    }
}
