//! Error taxonomy for the download engine.
//!
//! Every failure surfaces as a `RangeRequestError` with a coarse kind so
//! callers can branch on what went wrong without parsing messages.

use std::fmt;

/// Classification of a download failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport-level failure (connect, DNS, reset, timeout) that exhausted
    /// retries without producing a usable status code.
    Network,
    /// The server answered with an unexpected status (HEAD or plain GET non-200).
    Server,
    /// The response could not be interpreted: missing/unparseable
    /// `Content-Length`, or a range GET that did not return 206.
    InvalidResponse,
    /// Local filesystem failure, or a temp file inconsistent with the remote.
    File,
    /// Reserved: digest verification is a caller responsibility.
    ChecksumMismatch,
    /// Reserved.
    UnsupportedOperation,
    /// Cancellation observed at a suspension point.
    Cancelled,
}

impl ErrorKind {
    /// Stable string code for logs and error messages.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Server => "server_error",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::File => "file_error",
            ErrorKind::ChecksumMismatch => "checksum_mismatch",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Error type for all public operations of this crate.
#[derive(Debug, Clone)]
pub struct RangeRequestError {
    kind: ErrorKind,
    message: String,
}

impl RangeRequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn file(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::File, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "download cancelled")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when this error is a cancellation, not a real failure.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl fmt::Display for RangeRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeRequestError [{}]: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for RangeRequestError {}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RangeRequestError>;
