//! Orphaned temp-file sweeper.

use std::path::Path;
use std::time::{Duration, SystemTime};

/// Recursively delete regular files under `dir` whose names end with
/// `extension` and, when `older_than` is given, whose mtime is older than that
/// age. Per-file errors are tolerated silently; a missing directory deletes
/// nothing. Returns the number of files removed.
pub(crate) fn sweep(dir: &Path, extension: &str, older_than: Option<Duration>) -> usize {
    let cutoff = older_than.and_then(|age| SystemTime::now().checked_sub(age));
    let mut deleted = 0;
    sweep_dir(dir, extension, cutoff, &mut deleted);
    deleted
}

fn sweep_dir(dir: &Path, extension: &str, cutoff: Option<SystemTime>, deleted: &mut usize) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => continue,
        };
        if file_type.is_dir() {
            sweep_dir(&path, extension, cutoff, deleted);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let matches_ext = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(extension))
            .unwrap_or(false);
        if !matches_ext {
            continue;
        }
        if let Some(cutoff) = cutoff {
            let old_enough = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|mtime| mtime < cutoff)
                .unwrap_or(false);
            if !old_enough {
                continue;
            }
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed orphaned temp file");
                *deleted += 1;
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "could not remove temp file");
            }
        }
    }
}
