//! File sink: persist a fetch to disk with resume, conflict resolution, and
//! optional digest computation.
//!
//! Layered on the range client. Bytes stream into `<name><temp_extension>`;
//! on success the temp file is renamed over the resolved final path. A
//! partial temp file doubles as the resume state: its length is the offset
//! the next attempt continues from.

mod cleanup;
mod path;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{FetchOptions, RangeRequestClient};
use crate::config::RangeRequestConfig;
use crate::control::CancelToken;
use crate::digest::{self, ChecksumType};
use crate::error::{RangeRequestError, Result};
use crate::probe::ServerInfo;

/// Phase reported through the 3-arity progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloading,
    CalculatingChecksum,
}

/// What to do when the final path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileConflictStrategy {
    /// Delete the existing file and take its place.
    Overwrite,
    /// Pick the smallest free `name(n).ext` variant.
    Rename,
    /// Fail with a `file_error`.
    Error,
}

/// Outcome of a finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Where the file ended up (the `(n)` variant under `Rename`).
    pub file_path: PathBuf,
    /// Size of the finished file in bytes.
    pub file_size: u64,
    /// Lowercase hex digest, when one was requested.
    pub checksum: Option<String>,
    pub checksum_type: ChecksumType,
}

/// Progress callback of the sink: `(received, total, status)`.
pub type FileProgressFn = dyn Fn(u64, u64, DownloadStatus) + Send + Sync;

/// Options for [`FileDownloader::download_to_file`].
#[derive(Clone)]
pub struct DownloadOptions {
    /// Overrides the server/URL-derived filename.
    pub file_name: Option<String>,
    /// Continue from an existing temp file when the server accepts ranges.
    pub resume: bool,
    pub checksum: ChecksumType,
    pub on_conflict: FileConflictStrategy,
    pub cancel_token: Option<CancelToken>,
    pub on_progress: Option<Arc<FileProgressFn>>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            file_name: None,
            resume: true,
            checksum: ChecksumType::None,
            on_conflict: FileConflictStrategy::Overwrite,
            cancel_token: None,
            on_progress: None,
        }
    }
}

/// Downloads URLs to disk through a [`RangeRequestClient`].
pub struct FileDownloader {
    client: RangeRequestClient,
}

impl FileDownloader {
    pub fn new(client: RangeRequestClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: RangeRequestConfig) -> Self {
        Self::new(RangeRequestClient::with_config(config))
    }

    /// The underlying client, e.g. for `cancel_all`.
    pub fn client(&self) -> &RangeRequestClient {
        &self.client
    }

    /// Download `url` into `output_dir` and return where the bytes landed.
    pub fn download_to_file(
        &self,
        url: &str,
        output_dir: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadResult> {
        let info = self.client.check_server_info(url)?;
        let name = path::resolve_file_name(
            options.file_name.as_deref(),
            info.file_name.as_deref(),
            url,
        );
        std::fs::create_dir_all(output_dir).map_err(|e| {
            RangeRequestError::file(format!(
                "create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;
        let final_base = output_dir.join(&name);
        let temp_path = output_dir.join(format!(
            "{}{}",
            name,
            self.client.config().temp_file_extension
        ));

        if let Err(e) = self.stream_to_temp(url, &info, &temp_path, &options) {
            if !options.resume {
                let _ = std::fs::remove_file(&temp_path);
            }
            return Err(e);
        }

        let checksum = match options.checksum {
            ChecksumType::None => None,
            requested => {
                if let Some(on_progress) = &options.on_progress {
                    on_progress(
                        info.content_length,
                        info.content_length,
                        DownloadStatus::CalculatingChecksum,
                    );
                }
                Some(hash_in_background(&temp_path, requested)?)
            }
        };

        let file_size = std::fs::metadata(&temp_path)
            .map(|m| m.len())
            .map_err(|e| {
                RangeRequestError::file(format!("stat {}: {}", temp_path.display(), e))
            })?;
        let final_path = path::resolve_conflict(&final_base, options.on_conflict)?;
        std::fs::rename(&temp_path, &final_path).map_err(|e| {
            RangeRequestError::file(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                final_path.display(),
                e
            ))
        })?;
        tracing::info!(
            url,
            path = %final_path.display(),
            bytes = file_size,
            "download finished"
        );

        Ok(DownloadResult {
            file_path: final_path,
            file_size,
            checksum,
            checksum_type: options.checksum,
        })
    }

    /// Delete orphaned temp files under `directory`. The extension defaults to
    /// the configured one; with an age threshold only files modified longer
    /// ago than that are removed.
    pub fn cleanup_temp_files(
        &self,
        directory: &Path,
        temp_file_extension: Option<&str>,
        older_than: Option<Duration>,
    ) -> usize {
        let extension = temp_file_extension
            .unwrap_or(&self.client.config().temp_file_extension);
        cleanup::sweep(directory, extension, older_than)
    }

    /// Stream the body into the temp file, honoring the resume offset. The
    /// file handle is closed on every exit path before this returns.
    fn stream_to_temp(
        &self,
        url: &str,
        info: &ServerInfo,
        temp_path: &Path,
        options: &DownloadOptions,
    ) -> Result<()> {
        let resume = options.resume && info.accept_ranges;
        let (mut file, start_bytes) = open_temp(temp_path, resume)?;
        if start_bytes > info.content_length {
            return Err(RangeRequestError::file(format!(
                "temp file {} ({} bytes) exceeds remote file size ({} bytes)",
                temp_path.display(),
                start_bytes,
                info.content_length
            )));
        }

        let progress = options.on_progress.as_ref().map(|p| {
            let p = Arc::clone(p);
            Arc::new(move |received, total| p(received, total, DownloadStatus::Downloading))
                as Arc<crate::client::ProgressFn>
        });

        if start_bytes == info.content_length {
            tracing::debug!(path = %temp_path.display(), "temp file already complete, skipping network");
            if let Some(progress) = &progress {
                progress(info.content_length, info.content_length);
            }
            return Ok(());
        }
        if resume && start_bytes > 0 {
            tracing::info!(path = %temp_path.display(), offset = start_bytes, "resuming download");
        }

        let stream = self.client.fetch(
            url,
            FetchOptions {
                content_length: Some(info.content_length),
                accept_ranges: Some(info.accept_ranges),
                start_bytes,
                cancel_token: options.cancel_token.clone(),
                on_progress: progress,
            },
        );

        let flush_threshold = self.client.config().chunk_size as usize;
        let mut buffer: Vec<u8> = Vec::new();
        for item in stream {
            let chunk = item?;
            if buffer.is_empty() && chunk.len() >= flush_threshold {
                // Large chunk, nothing queued: skip the copy.
                write_all(&mut file, &chunk, temp_path)?;
                continue;
            }
            buffer.extend_from_slice(&chunk);
            if buffer.len() >= flush_threshold {
                write_all(&mut file, &buffer, temp_path)?;
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            write_all(&mut file, &buffer, temp_path)?;
        }
        file.sync_all().map_err(|e| {
            RangeRequestError::file(format!("sync {}: {}", temp_path.display(), e))
        })?;
        Ok(())
    }
}

impl Default for FileDownloader {
    fn default() -> Self {
        Self::new(RangeRequestClient::new())
    }
}

/// Open the temp file. Resuming appends to what is already there and reports
/// its length as the start offset; otherwise the file starts fresh.
fn open_temp(temp_path: &Path, resume: bool) -> Result<(File, u64)> {
    let open_failed = |e: std::io::Error| {
        RangeRequestError::file(format!("open temp file {}: {}", temp_path.display(), e))
    };
    if resume {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(temp_path)
            .map_err(open_failed)?;
        let len = file.metadata().map_err(open_failed)?.len();
        Ok((file, len))
    } else {
        let file = File::create(temp_path).map_err(open_failed)?;
        Ok((file, 0))
    }
}

fn write_all(file: &mut File, data: &[u8], temp_path: &Path) -> Result<()> {
    file.write_all(data).map_err(|e| {
        RangeRequestError::file(format!("write {}: {}", temp_path.display(), e))
    })
}

/// Hash off the consumer's thread and join before finalizing.
fn hash_in_background(path: &Path, checksum: ChecksumType) -> Result<String> {
    let path = path.to_path_buf();
    let handle = std::thread::spawn(move || digest::hash_file(&path, checksum));
    handle
        .join()
        .map_err(|_| RangeRequestError::file("checksum worker panicked"))?
}
