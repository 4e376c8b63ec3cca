//! Destination filename resolution and conflict handling.

use std::path::{Path, PathBuf};

use crate::error::{RangeRequestError, Result};
use crate::sink::FileConflictStrategy;

/// Fallback when the caller, the server, and the URL path all yield nothing.
const DEFAULT_FILENAME: &str = "download.bin";

/// Pick the final filename: caller-supplied, else server-supplied, else the
/// last URL path segment. The result is sanitized against path traversal.
pub(crate) fn resolve_file_name(
    explicit: Option<&str>,
    server: Option<&str>,
    url: &str,
) -> String {
    let candidate = explicit
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| server.filter(|s| !s.is_empty()).map(str::to_string))
        .or_else(|| last_url_segment(url));
    match candidate {
        Some(name) => {
            let sanitized = sanitize_file_name(&name);
            if sanitized.is_empty() {
                DEFAULT_FILENAME.to_string()
            } else {
                sanitized
            }
        }
        None => DEFAULT_FILENAME.to_string(),
    }
}

/// Replace path separators and every literal `..` so server-chosen names can
/// never escape the output directory.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    name.replace(['/', '\\'], "_").replace("..", "_")
}

fn last_url_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    Some(segment.to_string())
}

/// Resolve `path` against an existing file per the chosen strategy. Returns
/// the path the finished download should be renamed to.
pub(crate) fn resolve_conflict(path: &Path, strategy: FileConflictStrategy) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }
    match strategy {
        FileConflictStrategy::Overwrite => {
            std::fs::remove_file(path).map_err(|e| {
                RangeRequestError::file(format!("remove existing {}: {}", path.display(), e))
            })?;
            Ok(path.to_path_buf())
        }
        FileConflictStrategy::Error => Err(RangeRequestError::file(format!(
            "File already exists: {}",
            path.display()
        ))),
        FileConflictStrategy::Rename => {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_FILENAME);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let (stem, ext) = split_extension(name);
            for n in 1u32.. {
                let candidate = dir.join(format!("{}({}){}", stem, n, ext));
                if !candidate.exists() {
                    return Ok(candidate);
                }
            }
            unreachable!("conflict rename counter exhausted");
        }
    }
}

/// Split on the last `.`; a leading dot (hidden file) counts as no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}
