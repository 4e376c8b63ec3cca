//! Parallel HTTP range-request download engine: concurrent range GETs
//! reassembled into an ordered byte stream, with optional persistence to disk,
//! resume, and digest computation.

pub mod client;
pub mod config;
pub mod control;
pub mod digest;
pub mod error;
pub mod http;
pub mod probe;
pub mod retry;
pub mod scheduler;
pub mod sink;

pub use client::{ChunkStream, FetchOptions, ProgressFn, RangeRequestClient};
pub use config::RangeRequestConfig;
pub use control::{CancelToken, CancelTokenGroup};
pub use digest::ChecksumType;
pub use error::{ErrorKind, RangeRequestError, Result};
pub use probe::ServerInfo;
pub use scheduler::{plan_ranges, ChunkRange};
pub use sink::{
    DownloadOptions, DownloadResult, DownloadStatus, FileConflictStrategy, FileDownloader,
    FileProgressFn,
};
